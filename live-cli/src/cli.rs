use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "live", author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// HTTP request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Override the browser user agent
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// BiliBili cookie
    #[arg(long, global = true, env = "LIVE_BILIBILI_COOKIE", hide_env_values = true)]
    pub bilibili_cookie: Option<String>,

    /// Douyu cookie
    #[arg(long, global = true, env = "LIVE_DOUYU_COOKIE", hide_env_values = true)]
    pub douyu_cookie: Option<String>,

    /// Huya cookie
    #[arg(long, global = true, env = "LIVE_HUYA_COOKIE", hide_env_values = true)]
    pub huya_cookie: Option<String>,

    /// Douyin cookie
    #[arg(long, global = true, env = "LIVE_DOUYIN_COOKIE", hide_env_values = true)]
    pub douyin_cookie: Option<String>,
}

impl Args {
    /// Cookies given on the command line or through the environment.
    pub fn cookies(&self) -> Vec<(&'static str, &str)> {
        [
            ("bilibili", &self.bilibili_cookie),
            ("douyu", &self.douyu_cookie),
            ("huya", &self.huya_cookie),
            ("douyin", &self.douyin_cookie),
        ]
        .into_iter()
        .filter_map(|(platform, cookie)| cookie.as_deref().map(|c| (platform, c)))
        .collect()
    }
}

/// A room given either as a URL or as `--platform` plus a room id.
#[derive(clap::Args, Debug, Clone)]
pub struct RoomArgs {
    /// Room URL, or a bare room id together with --platform
    pub room: String,

    /// Platform id (bilibili, douyu, huya, douyin)
    #[arg(short, long)]
    pub platform: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List supported platforms
    Sites {
        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// List the category tree of a platform
    Categories {
        platform: String,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// List live rooms in a category
    Rooms {
        platform: String,

        /// Sub-category id
        #[arg(long)]
        id: String,

        /// Parent category id
        #[arg(long, default_value = "")]
        parent: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// List recommended rooms
    Recommend {
        platform: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Search rooms or anchors
    Search {
        platform: String,

        keyword: String,

        /// Search anchors instead of rooms
        #[arg(long)]
        anchors: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Show room details
    Detail {
        #[command(flatten)]
        room: RoomArgs,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// List playback qualities of a live room
    Qualities {
        #[command(flatten)]
        room: RoomArgs,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Resolve playback URLs
    Play {
        #[command(flatten)]
        room: RoomArgs,

        /// Quality label or token; best available when omitted
        #[arg(long)]
        quality: Option<String>,

        /// Pick the best quality without prompting
        #[arg(short = 'y', long)]
        auto_select: bool,

        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Follow the live chat until Ctrl-C
    Chat {
        #[command(flatten)]
        room: RoomArgs,

        /// Print each message as a JSON line
        #[arg(long)]
        json: bool,

        /// Hide viewer-count updates
        #[arg(long)]
        no_online: bool,
    },

    /// Show or reset the configuration file
    Config {
        #[arg(long)]
        show: bool,

        #[arg(long)]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Output format requested on the command line, if the command has one.
    pub fn output(&self) -> Option<OutputFormat> {
        match self {
            Commands::Sites { output }
            | Commands::Categories { output, .. }
            | Commands::Rooms { output, .. }
            | Commands::Recommend { output, .. }
            | Commands::Search { output, .. }
            | Commands::Detail { output, .. }
            | Commands::Qualities { output, .. }
            | Commands::Play { output, .. } => *output,
            Commands::Chat { json: true, .. } => Some(OutputFormat::JsonCompact),
            _ => None,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
    JsonCompact,
    Table,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonCompact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_play_with_platform() {
        let args = Args::try_parse_from([
            "live", "play", "21852", "--platform", "bilibili", "--quality", "原画", "-o", "json",
        ])
        .unwrap();
        match args.command {
            Commands::Play {
                room,
                quality,
                output,
                ..
            } => {
                assert_eq!(room.room, "21852");
                assert_eq!(room.platform.as_deref(), Some("bilibili"));
                assert_eq!(quality.as_deref(), Some("原画"));
                assert_eq!(output, Some(OutputFormat::Json));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_chat_json_implies_compact_output() {
        let args =
            Args::try_parse_from(["live", "chat", "https://www.douyu.com/9999", "--json"]).unwrap();
        assert_eq!(args.command.output(), Some(OutputFormat::JsonCompact));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["live", "-v", "-q", "sites"]).is_err());
    }
}
