//! Douyin (抖音). Room detail and playback through `webcast/room/web/enter`;
//! listings and chat need signed requests and are not offered.

mod models;
mod site;

pub use site::{DouyinAdapter, URL_REGEX};

pub const PLATFORM_ID: &str = "douyin";
pub const PLATFORM_NAME: &str = "抖音直播";
