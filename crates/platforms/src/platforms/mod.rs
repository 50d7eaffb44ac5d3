//! Concrete adapters, one module per platform.

pub mod bilibili;
pub mod douyin;
pub mod douyu;
pub mod huya;

/// Parse display counts such as `"1.2万"` or `"3456"`. Unparseable input is 0.
pub(crate) fn parse_count(input: &str) -> u64 {
    let input = input.trim();
    let (number, scale) = if let Some(n) = input.strip_suffix('万') {
        (n.trim(), 10_000.0)
    } else if let Some(n) = input.strip_suffix('亿') {
        (n.trim(), 100_000_000.0)
    } else {
        return input.replace(',', "").parse().unwrap_or(0);
    };
    number
        .parse::<f64>()
        .map(|n| (n * scale).round() as u64)
        .unwrap_or(0)
}
