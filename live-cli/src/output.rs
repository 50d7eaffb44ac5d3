use crate::{cli::OutputFormat, error::Result};
#[cfg(feature = "colored-output")]
use colored::*;
use live_platforms::{
    AnchorPage, Category, ChatMessage, MessageColor, MessageKind, PlayQuality, PlayUrl,
    RoomDetail, RoomPage, Site,
};
use serde::Serialize;
use std::io::Write;
#[cfg(feature = "table-output")]
use tabled::{Table, Tabled, settings::Style};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_sites(&self, sites: &[Site], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Self::format_json(sites, true),
            OutputFormat::JsonCompact => Self::format_json(sites, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct SiteRow<'a> {
                    id: &'a str,
                    name: &'a str,
                }
                let rows = sites.iter().map(|s| SiteRow {
                    id: &s.id,
                    name: &s.name,
                });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = self.colorize("Supported platforms:", &Color::Green, true);
                output.push('\n');
                for site in sites {
                    output.push_str(&format!(
                        "  {} {}\n",
                        self.colorize(&format!("{:<10}", site.id), &Color::Yellow, false),
                        site.name
                    ));
                }
                Ok(output)
            }
        }
    }

    pub fn format_categories(&self, categories: &[Category], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Self::format_json(categories, true),
            OutputFormat::JsonCompact => Self::format_json(categories, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct CategoryRow<'a> {
                    parent: &'a str,
                    id: &'a str,
                    name: &'a str,
                }
                let rows = categories.iter().flat_map(|c| {
                    c.children.iter().map(move |sub| CategoryRow {
                        parent: &c.name,
                        id: &sub.id,
                        name: &sub.name,
                    })
                });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = String::new();
                for category in categories {
                    output.push_str(&self.colorize(
                        &format!("{} ({})", category.name, category.id),
                        &Color::Green,
                        true,
                    ));
                    output.push('\n');
                    for sub in &category.children {
                        output.push_str(&format!(
                            "  {} {}\n",
                            self.colorize(&format!("{:<8}", sub.id), &Color::Yellow, false),
                            sub.name
                        ));
                    }
                }
                Ok(output)
            }
        }
    }

    pub fn format_rooms(&self, page: &RoomPage, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Self::format_json(page, true),
            OutputFormat::JsonCompact => Self::format_json(page, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct RoomRow<'a> {
                    room: &'a str,
                    anchor: &'a str,
                    online: u64,
                    title: &'a str,
                }
                let rows = page.items.iter().map(|r| RoomRow {
                    room: &r.room_id,
                    anchor: &r.user_name,
                    online: r.online,
                    title: &r.title,
                });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = String::new();
                for room in &page.items {
                    output.push_str(&format!(
                        "{} {} {} {}\n",
                        self.colorize(&format!("{:<12}", room.room_id), &Color::Yellow, false),
                        self.colorize(&room.user_name, &Color::Green, false),
                        self.colorize(&format!("[{}]", room.online), &Color::Cyan, false),
                        room.title
                    ));
                }
                if page.items.is_empty() {
                    output.push_str("No rooms found\n");
                }
                if page.has_more {
                    output.push_str(&self.colorize("(more pages available)", &Color::Blue, false));
                    output.push('\n');
                }
                Ok(output)
            }
        }
    }

    pub fn format_anchors(&self, page: &AnchorPage, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Self::format_json(page, true),
            OutputFormat::JsonCompact => Self::format_json(page, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct AnchorRow<'a> {
                    room: &'a str,
                    anchor: &'a str,
                    followers: u64,
                    live: bool,
                }
                let rows = page.items.iter().map(|a| AnchorRow {
                    room: &a.room_id,
                    anchor: &a.user_name,
                    followers: a.followers,
                    live: a.is_live,
                });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = String::new();
                for anchor in &page.items {
                    let status = if anchor.is_live {
                        self.colorize("LIVE", &Color::Green, true)
                    } else {
                        "offline".to_string()
                    };
                    output.push_str(&format!(
                        "{} {} {} followers, {}\n",
                        self.colorize(&format!("{:<12}", anchor.room_id), &Color::Yellow, false),
                        anchor.user_name,
                        anchor.followers,
                        status
                    ));
                }
                if page.items.is_empty() {
                    output.push_str("No anchors found\n");
                }
                Ok(output)
            }
        }
    }

    pub fn format_detail(&self, detail: &RoomDetail, format: &OutputFormat) -> Result<String> {
        let status = if detail.status {
            if detail.is_record { "Replay" } else { "Live" }
        } else {
            "Offline"
        };
        let mut fields = vec![
            ("Platform", detail.platform_id.clone()),
            ("Room", detail.room_id.clone()),
            ("Title", detail.title.clone()),
            ("Anchor", detail.user_name.clone()),
            ("Status", status.to_string()),
            ("Online", detail.online.to_string()),
            ("URL", detail.url.clone()),
            ("Cover", detail.cover.clone()),
        ];
        if let Some(show_time) = &detail.show_time {
            fields.push(("Live since", show_time.clone()));
        }
        if let Some(intro) = detail.introduction.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("Introduction", intro.to_string()));
        }
        if let Some(notice) = detail.notice.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("Notice", notice.to_string()));
        }

        match format {
            OutputFormat::Json => Self::format_json(detail, true),
            OutputFormat::JsonCompact => Self::format_json(detail, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct DetailRow<'a> {
                    property: &'a str,
                    value: &'a str,
                }
                let rows = fields.iter().map(|(property, value)| DetailRow {
                    property,
                    value,
                });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = self.colorize("Room Information:", &Color::Green, true);
                output.push('\n');
                for (property, value) in &fields {
                    output.push_str(&format!(
                        "  {}: {}\n",
                        self.colorize(property, &Color::Yellow, false),
                        self.colorize(value, &Color::Cyan, false)
                    ));
                }
                Ok(output)
            }
        }
    }

    pub fn format_qualities(&self, qualities: &[PlayQuality], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Self::format_json(qualities, true),
            OutputFormat::JsonCompact => Self::format_json(qualities, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct QualityRow<'a> {
                    label: &'a str,
                    sort: i64,
                    token: &'a str,
                }
                let rows = qualities.iter().map(|q| QualityRow {
                    label: &q.label,
                    sort: q.sort,
                    token: &q.data,
                });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = self.colorize("Available qualities:", &Color::Green, true);
                output.push('\n');
                for quality in qualities {
                    output.push_str(&format!(
                        "  {} {}\n",
                        self.colorize(&quality.label, &Color::Yellow, false),
                        self.colorize(&format!("({})", quality.sort), &Color::Cyan, false)
                    ));
                }
                if qualities.is_empty() {
                    output.push_str("  none, the room is probably offline\n");
                }
                Ok(output)
            }
        }
    }

    pub fn format_play_url(
        &self,
        quality: &PlayQuality,
        play_url: &PlayUrl,
        format: &OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Json => Self::format_json(play_url, true),
            OutputFormat::JsonCompact => Self::format_json(play_url, false),
            #[cfg(feature = "table-output")]
            OutputFormat::Table => {
                #[derive(Tabled)]
                struct UrlRow<'a> {
                    rank: usize,
                    url: &'a str,
                }
                let rows = play_url
                    .urls
                    .iter()
                    .enumerate()
                    .map(|(i, url)| UrlRow { rank: i + 1, url });
                Ok(Self::table(rows))
            }
            _ => {
                let mut output = self.colorize(
                    &format!("Stream URLs ({}):", quality.label),
                    &Color::Green,
                    true,
                );
                output.push('\n');
                for url in &play_url.urls {
                    output.push_str(&format!("  {}\n", self.colorize(url, &Color::Blue, false)));
                }
                if !play_url.headers.is_empty() {
                    output.push_str(&self.colorize("Headers:", &Color::Green, true));
                    output.push('\n');
                    for (name, value) in &play_url.headers {
                        output.push_str(&format!(
                            "  {}: {}\n",
                            self.colorize(name, &Color::Yellow, false),
                            value
                        ));
                    }
                }
                Ok(output)
            }
        }
    }

    /// One line per chat message.
    pub fn format_chat(&self, message: &ChatMessage, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string(message)? + "\n");
        }
        let line = match message.kind {
            MessageKind::Chat => {
                let text = self.colorize_message(&message.message, message.color);
                format!(
                    "{}: {}",
                    self.colorize(&message.user_name, &Color::Yellow, false),
                    text
                )
            }
            MessageKind::Gift => self.colorize(
                &format!("[gift] {} {}", message.user_name, message.message),
                &Color::Green,
                false,
            ),
            MessageKind::SuperChat => self.colorize(
                &format!("[SC] {}: {}", message.user_name, message.message),
                &Color::Cyan,
                true,
            ),
            MessageKind::Online => {
                self.colorize(&format!("[online] {}", message.message), &Color::Blue, false)
            }
        };
        Ok(line + "\n")
    }

    fn format_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json + "\n")
    }

    #[cfg(feature = "table-output")]
    fn table<R: Tabled>(rows: impl IntoIterator<Item = R>) -> String {
        Table::new(rows).with(Style::modern()).to_string() + "\n"
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }

    /// Chat text in the sender's color; white is left unstyled.
    fn colorize_message(&self, text: &str, color: MessageColor) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored && !color.is_white() {
                return text.truecolor(color.r, color.g, color.b).to_string();
            }
            text.to_string()
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = color;
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
}

pub fn write_output(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
