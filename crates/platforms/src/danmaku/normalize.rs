//! Shared normalization rules: packed chat colors and play-URL preference.

use crate::model::MessageColor;

/// Normalize a packed color integer.
///
/// The value is rendered as unpadded hex, then handled by [`color_from_hex`].
/// It is not zero-padded first, so values below `0x100` (e.g. `0xff`) come
/// out white rather than as a shade of blue.
pub fn color_from_packed(value: u64) -> MessageColor {
    color_from_hex(&format!("{value:x}"))
}

/// Normalize a hex color string of 4, 6 or 8 digits.
///
/// Odd-length input gets one leading zero first. 4 digits are read as `00` +
/// value, 6 digits as `RRGGBB`, 8 digits as `AARRGGBB` with alpha dropped.
/// Any other length, or non-hex input, yields white.
pub fn color_from_hex(input: &str) -> MessageColor {
    let hex = input.trim().trim_start_matches('#');
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return MessageColor::WHITE;
    }

    let hex = if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else {
        hex.to_string()
    };

    let rgb = match hex.len() {
        4 => format!("00{hex}"),
        6 => hex,
        8 => hex[2..].to_string(),
        _ => return MessageColor::WHITE,
    };

    match u32::from_str_radix(&rgb, 16) {
        Ok(v) => MessageColor::from_rgb(v),
        Err(_) => MessageColor::WHITE,
    }
}

/// Whether a URL is served from the lower-preference `mcdn` network.
pub fn is_mcdn(url: &str) -> bool {
    url.contains("mcdn")
}

/// Move `mcdn` URLs behind all others, keeping relative order within each group.
pub fn sort_mcdn_last(urls: &mut [String]) {
    // sort_by_key is stable
    urls.sort_by_key(|url| is_mcdn(url));
}
