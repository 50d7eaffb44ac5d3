use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use live_platforms::{
    AdapterRegistry, MessageKind, PlatformAdapter, PlatformConfig, PlayQuality, RoomDetail,
    SubCategory,
};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::{OutputFormat, RoomArgs};
use crate::error::{CliError, Result};
use crate::output::{OutputManager, write_output};

pub struct CommandExecutor {
    registry: AdapterRegistry,
    output: OutputManager,
    default_format: OutputFormat,
    interactive: bool,
}

impl CommandExecutor {
    pub fn new(
        platform: &PlatformConfig,
        default_format: OutputFormat,
        colored: bool,
        interactive: bool,
    ) -> Result<Self> {
        let colored = colored && std::io::stdout().is_terminal();
        Ok(Self {
            registry: AdapterRegistry::with_config(platform)?,
            output: OutputManager::new(colored),
            default_format,
            interactive,
        })
    }

    fn format(&self, requested: Option<OutputFormat>) -> OutputFormat {
        requested.unwrap_or(self.default_format)
    }

    /// Spinner on stderr while waiting on the network, only in pretty mode.
    fn spinner(&self, format: &OutputFormat, message: &str) -> Option<ProgressBar> {
        if *format != OutputFormat::Pretty || !std::io::stderr().is_terminal() {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(120));
        if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
            pb.set_style(style.tick_strings(&[
                "▹▹▹▹▹", "▸▹▹▹▹", "▹▸▹▹▹", "▹▹▸▹▹", "▹▹▹▸▹", "▹▹▹▹▸", "▪▪▪▪▪",
            ]));
        }
        pb.set_message(message.to_string());
        Some(pb)
    }

    fn resolve_room(&self, room: &RoomArgs) -> Result<(Arc<dyn PlatformAdapter>, String)> {
        match &room.platform {
            Some(platform) => Ok((self.registry.get(platform)?, room.room.trim().to_string())),
            None => {
                let (adapter, reference) = self.registry.resolve(&room.room)?;
                Ok((adapter, reference.room_id))
            }
        }
    }

    async fn fetch_detail(
        &self,
        room: &RoomArgs,
        format: &OutputFormat,
    ) -> Result<(Arc<dyn PlatformAdapter>, RoomDetail)> {
        let (adapter, room_id) = self.resolve_room(room)?;
        debug!(platform = adapter.id(), room_id = %room_id, "Fetching room detail");
        let spinner = self.spinner(format, "Fetching room information...");
        let detail = adapter.room_detail(&room_id).await;
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        Ok((adapter, detail?))
    }

    pub fn list_sites(&self, output: Option<OutputFormat>) -> Result<()> {
        let format = self.format(output);
        let sites = self.registry.sites();
        write_output(&self.output.format_sites(&sites, &format)?)
    }

    pub async fn list_categories(&self, platform: &str, output: Option<OutputFormat>) -> Result<()> {
        let format = self.format(output);
        let adapter = self.registry.get(platform)?;
        let categories = adapter.categories().await?;
        info!(platform, count = categories.len(), "Fetched categories");
        write_output(&self.output.format_categories(&categories, &format)?)
    }

    pub async fn list_category_rooms(
        &self,
        platform: &str,
        id: &str,
        parent: &str,
        page: u32,
        output: Option<OutputFormat>,
    ) -> Result<()> {
        let format = self.format(output);
        let adapter = self.registry.get(platform)?;
        let category = SubCategory::new(id, "", parent);
        let rooms = adapter.category_rooms(&category, page).await?;
        write_output(&self.output.format_rooms(&rooms, &format)?)
    }

    pub async fn recommend(&self, platform: &str, page: u32, output: Option<OutputFormat>) -> Result<()> {
        let format = self.format(output);
        let adapter = self.registry.get(platform)?;
        let rooms = adapter.recommend_rooms(page).await?;
        write_output(&self.output.format_rooms(&rooms, &format)?)
    }

    pub async fn search(
        &self,
        platform: &str,
        keyword: &str,
        anchors: bool,
        page: u32,
        output: Option<OutputFormat>,
    ) -> Result<()> {
        let format = self.format(output);
        let adapter = self.registry.get(platform)?;
        if anchors {
            let result = adapter.search_anchors(keyword, page).await?;
            write_output(&self.output.format_anchors(&result, &format)?)
        } else {
            let result = adapter.search_rooms(keyword, page).await?;
            write_output(&self.output.format_rooms(&result, &format)?)
        }
    }

    pub async fn detail(&self, room: &RoomArgs, output: Option<OutputFormat>) -> Result<()> {
        let format = self.format(output);
        let (_, detail) = self.fetch_detail(room, &format).await?;
        write_output(&self.output.format_detail(&detail, &format)?)
    }

    pub async fn qualities(&self, room: &RoomArgs, output: Option<OutputFormat>) -> Result<()> {
        let format = self.format(output);
        let (adapter, detail) = self.fetch_detail(room, &format).await?;
        let qualities = adapter.play_qualities(&detail).await?;
        write_output(&self.output.format_qualities(&qualities, &format)?)
    }

    pub async fn play(
        &self,
        room: &RoomArgs,
        quality: Option<&str>,
        auto_select: bool,
        output: Option<OutputFormat>,
    ) -> Result<()> {
        let format = self.format(output);
        let (adapter, detail) = self.fetch_detail(room, &format).await?;
        if !detail.status {
            warn!(room_id = %detail.room_id, "Room is offline");
        }
        let qualities = adapter.play_qualities(&detail).await?;
        if qualities.is_empty() {
            return Err(CliError::invalid_input(format!(
                "no playable qualities for {}",
                detail.reference()
            )));
        }

        let prompt = self.interactive && !auto_select && format == OutputFormat::Pretty;
        let selected = select_quality(qualities, quality, prompt)?;
        info!(quality = %selected.label, "Resolving stream URLs");
        let play_url = adapter.play_urls(&detail, &selected).await?;
        write_output(&self.output.format_play_url(&selected, &play_url, &format)?)
    }

    /// Stream chat messages until Ctrl-C or until the connection ends.
    pub async fn chat(&self, room: &RoomArgs, json: bool, no_online: bool) -> Result<()> {
        let format = if json {
            OutputFormat::JsonCompact
        } else {
            OutputFormat::Pretty
        };
        let (adapter, detail) = self.fetch_detail(room, &format).await?;
        let client = adapter.chat_client();
        let mut stream = client.start(&detail).await?;
        info!(room = %detail.reference(), "Connected to chat, press Ctrl-C to stop");

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let result = loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    debug!("Interrupted");
                    break Ok(());
                }
                message = stream.next() => match message {
                    Some(Ok(message)) => {
                        if no_online && message.kind == MessageKind::Online {
                            continue;
                        }
                        write_output(&self.output.format_chat(&message, json)?)?;
                    }
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                },
            }
        };

        client.stop().await;
        info!(state = ?client.state(), "Chat closed");
        result
    }
}

/// Pick a quality by label or token, prompt for one, or take the best.
fn select_quality(
    mut qualities: Vec<PlayQuality>,
    wanted: Option<&str>,
    prompt: bool,
) -> Result<PlayQuality> {
    qualities.sort_by(|a, b| b.sort.cmp(&a.sort));

    if let Some(wanted) = wanted {
        return qualities
            .into_iter()
            .find(|q| q.label.eq_ignore_ascii_case(wanted) || q.data == wanted)
            .ok_or_else(|| CliError::invalid_input(format!("quality not available: {wanted}")));
    }

    #[cfg(feature = "interactive")]
    {
        if prompt && qualities.len() > 1 && std::io::stdin().is_terminal() {
            let labels: Vec<String> = qualities.iter().map(|q| q.label.clone()).collect();
            let choice = inquire::Select::new("Select a quality:", labels).raw_prompt()?;
            return Ok(qualities.swap_remove(choice.index));
        }
    }
    #[cfg(not(feature = "interactive"))]
    let _ = prompt;

    qualities
        .into_iter()
        .next()
        .ok_or_else(|| CliError::invalid_input("no playable qualities"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualities() -> Vec<PlayQuality> {
        vec![
            PlayQuality::new("高清", "2", 2),
            PlayQuality::new("原画", "4", 4),
            PlayQuality::new("标清", "1", 1),
        ]
    }

    #[test]
    fn test_select_best_by_default() {
        let selected = select_quality(qualities(), None, false).unwrap();
        assert_eq!(selected.label, "原画");
    }

    #[test]
    fn test_select_by_label_or_token() {
        assert_eq!(select_quality(qualities(), Some("标清"), false).unwrap().data, "1");
        assert_eq!(select_quality(qualities(), Some("2"), false).unwrap().label, "高清");
        assert!(select_quality(qualities(), Some("蓝光"), false).is_err());
    }

    #[test]
    fn test_resolve_room_by_url_and_platform() {
        let executor =
            CommandExecutor::new(&PlatformConfig::default(), OutputFormat::Pretty, false, false)
                .unwrap();

        let by_url = RoomArgs {
            room: "https://www.huya.com/kaerlol".to_string(),
            platform: None,
        };
        let (adapter, room_id) = executor.resolve_room(&by_url).unwrap();
        assert_eq!((adapter.id(), room_id.as_str()), ("huya", "kaerlol"));

        let by_id = RoomArgs {
            room: "21852".to_string(),
            platform: Some("bilibili".to_string()),
        };
        let (adapter, room_id) = executor.resolve_room(&by_id).unwrap();
        assert_eq!((adapter.id(), room_id.as_str()), ("bilibili", "21852"));

        let unknown = RoomArgs {
            room: "https://example.com/1".to_string(),
            platform: None,
        };
        assert!(executor.resolve_room(&unknown).is_err());
    }
}
