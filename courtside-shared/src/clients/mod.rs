pub mod db;
pub mod email;
pub mod media;
pub mod redis;
pub mod storage;
pub mod stripe;
