pub mod backoff;
pub mod freshness;
pub mod materialize;
pub mod paths;
pub mod walker;
pub mod work;
