//! Huya (虎牙). Listings and playback come from the web page and the
//! `cache.php` API. There is no chat client for this platform.

mod site;

pub use site::{HuyaAdapter, URL_REGEX};

pub const PLATFORM_ID: &str = "huya";
pub const PLATFORM_NAME: &str = "虎牙直播";
