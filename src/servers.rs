//! Per-server behaviour toggles and the `config` admin command.

use crate::db::Database;
use crate::reply::{ReplyContent, ReplyStyle};
use crate::resolver::ResolveOptions;
use tracing::info;

pub const DOCS_URL: &str = "https://github.com/tyzbit/go-discord-amputator";

/// Smallest link depth the resolver is asked to follow.
pub const MIN_MAX_DEPTH: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_id: String,
    pub name: String,
    pub resolution_enabled: bool,
    pub reply_to_original: bool,
    pub use_embed: bool,
    pub guess_and_check: bool,
    pub max_depth: i64,
}

impl ServerConfig {
    /// Defaults applied to a server on first contact.
    pub fn with_defaults(server_id: &str, name: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            name: name.to_string(),
            resolution_enabled: true,
            reply_to_original: false,
            use_embed: true,
            guess_and_check: true,
            max_depth: 3,
        }
    }

    pub fn reply_style(&self) -> ReplyStyle {
        ReplyStyle::from_flags(self.use_embed, self.reply_to_original)
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            guess_and_check: self.guess_and_check,
            max_depth: self.max_depth,
        }
    }

    fn display_value(&self, setting: Setting) -> String {
        let flag = |on: bool| if on { "on" } else { "off" }.to_string();
        match setting {
            Setting::Switch => flag(self.resolution_enabled),
            Setting::ReplyTo => flag(self.reply_to_original),
            Setting::Embed => flag(self.use_embed),
            Setting::Guess => flag(self.guess_and_check),
            Setting::MaxDepth => self.max_depth.to_string(),
        }
    }
}

impl Default for ServerConfig {
    /// Used for direct messages and servers without a stored config.
    fn default() -> Self {
        Self::with_defaults("0", "default")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Switch,
    ReplyTo,
    Embed,
    Guess,
    MaxDepth,
}

pub struct SettingSpec {
    pub setting: Setting,
    /// Word used in `<prefix> config <keyword> <value>`.
    pub keyword: &'static str,
    /// Column in `server_configs`.
    pub column: &'static str,
    pub label: &'static str,
}

pub const SETTINGS: [SettingSpec; 5] = [
    SettingSpec {
        setting: Setting::Switch,
        keyword: "switch",
        column: "resolution_enabled",
        label: "Amputation Enabled",
    },
    SettingSpec {
        setting: Setting::ReplyTo,
        keyword: "replyto",
        column: "reply_to_original",
        label: "Reply to original message",
    },
    SettingSpec {
        setting: Setting::Embed,
        keyword: "embed",
        column: "use_embed",
        label: "Use embed to reply",
    },
    SettingSpec {
        setting: Setting::Guess,
        keyword: "guess",
        column: "guess_and_check",
        label: "Guess at AMP URLs if they are difficult",
    },
    SettingSpec {
        setting: Setting::MaxDepth,
        keyword: "maxdepth",
        column: "max_depth",
        label: "How many links deep to go to try to find the non-AMP link",
    },
];

impl Setting {
    pub fn spec(self) -> &'static SettingSpec {
        let index = match self {
            Setting::Switch => 0,
            Setting::ReplyTo => 1,
            Setting::Embed => 2,
            Setting::Guess => 3,
            Setting::MaxDepth => 4,
        };
        &SETTINGS[index]
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        SETTINGS
            .iter()
            .find(|s| s.keyword == keyword)
            .map(|s| s.setting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    Flag(bool),
    Depth(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    Get,
    Set {
        setting: Setting,
        raw: String,
        value: SettingValue,
    },
    InvalidValue {
        setting: Setting,
        raw: String,
    },
    Unknown {
        setting: String,
        raw: String,
    },
}

/// Parse `<prefix> config <setting> <value>`.
///
/// Anything other than exactly four space-separated words is a `get`.
pub fn parse_config_command(content: &str) -> ConfigCommand {
    let words: Vec<&str> = content.split(' ').collect();
    if words.len() != 4 {
        return ConfigCommand::Get;
    }
    let (keyword, raw) = (words[2], words[3].to_string());
    if keyword == "get" {
        return ConfigCommand::Get;
    }

    let Some(setting) = Setting::from_keyword(keyword) else {
        return ConfigCommand::Unknown {
            setting: keyword.to_string(),
            raw,
        };
    };

    let value = match setting {
        Setting::MaxDepth => match raw.parse::<i64>() {
            Ok(depth) if depth >= MIN_MAX_DEPTH => SettingValue::Depth(depth),
            _ => return ConfigCommand::InvalidValue { setting, raw },
        },
        _ => SettingValue::Flag(raw == "on"),
    };

    ConfigCommand::Set {
        setting,
        raw,
        value,
    }
}

/// Record that a server is known, creating its config on first contact.
///
/// Returns `true` when the server was seen for the first time.
pub async fn register_server(db: &Database, server_id: &str, name: &str) -> anyhow::Result<bool> {
    let server_id = server_id.to_string();
    let name = name.to_string();
    let created = db
        .run_blocking(move |db| db.register_server(&server_id, &name))
        .await?;
    Ok(created)
}

/// Stored config for a server, or the defaults when there is none.
pub async fn get_server_config(db: &Database, server_id: Option<&str>) -> anyhow::Result<ServerConfig> {
    let Some(server_id) = server_id.map(str::to_string) else {
        return Ok(ServerConfig::default());
    };
    let stored = db
        .run_blocking(move |db| db.get_server_config(&server_id))
        .await?;
    Ok(stored.unwrap_or_default())
}

/// Apply one setting. Fails unless exactly one row changed, in which case
/// the stored config is left as it was.
pub async fn update_server_setting(
    db: &Database,
    server_id: &str,
    setting: Setting,
    value: SettingValue,
) -> anyhow::Result<()> {
    let id = server_id.to_string();
    let rows = db
        .run_blocking(move |db| db.update_server_setting(&id, setting, value))
        .await?;
    if rows != 1 {
        anyhow::bail!(
            "did not expect {} rows to be affected updating server config for server {}",
            rows,
            server_id
        );
    }
    info!("Server {}: {} updated to {:?}", server_id, setting.spec().keyword, value);
    Ok(())
}

pub fn config_reply(config: &ServerConfig) -> ReplyContent {
    let mut reply = ReplyContent::new("Amputator Config", "")
        .with_field("Server ID", config.server_id.clone())
        .with_field("Server Name", config.name.clone());
    for spec in &SETTINGS {
        reply = reply.with_field(spec.label, config.display_value(spec.setting));
    }
    reply
}

pub fn updated_reply(setting: Setting, raw: &str) -> ReplyContent {
    ReplyContent::new(
        "Setting Updated",
        format!("{} set to {}", setting.spec().keyword, raw),
    )
}

pub fn usage_error_reply(raw: &str) -> ReplyContent {
    ReplyContent::new(
        format!("Unable to set {}", raw),
        format!("See {} for usage", DOCS_URL),
    )
}
