//! Usage statistics, derived on demand from the append-only event logs.

use crate::db::Database;
use crate::reply::ReplyContent;

const TOP_DOMAIN_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    MessagesActedOn,
    MessagesSent,
    CallsToResolver,
    UrlsAmputated,
    TopDomains,
    ServersWatched,
}

/// Display order and labels of the stats embed.
pub const STAT_LABELS: [(StatField, &str); 6] = [
    (StatField::MessagesActedOn, "Messages Acted On"),
    (StatField::MessagesSent, "Messages Sent"),
    (StatField::CallsToResolver, "Calls to Amputator API"),
    (StatField::UrlsAmputated, "URLs Amputated"),
    (StatField::TopDomains, "Top 5 Domains"),
    (StatField::ServersWatched, "Servers Watched"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotStats {
    pub messages_acted_on: i64,
    pub messages_sent: i64,
    pub calls_to_resolver: i64,
    pub urls_amputated: i64,
    pub top_domains: Vec<(String, i64)>,
    pub servers_watched: i64,
}

impl BotStats {
    /// Scan the logs. `server_id = None` gives global stats.
    pub fn collect(db: &Database, bot_id: &str, server_id: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            messages_acted_on: db.count_message_events(server_id)?,
            messages_sent: db.count_messages_by_author(bot_id, server_id)?,
            calls_to_resolver: db.count_resolver_calls(server_id)?,
            urls_amputated: db.count_response_urls(server_id)?,
            top_domains: db.top_response_domains(server_id, TOP_DOMAIN_COUNT)?,
            servers_watched: db.count_servers()?,
        })
    }

    pub fn value(&self, field: StatField) -> String {
        match field {
            StatField::MessagesActedOn => self.messages_acted_on.to_string(),
            StatField::MessagesSent => self.messages_sent.to_string(),
            StatField::CallsToResolver => self.calls_to_resolver.to_string(),
            StatField::UrlsAmputated => self.urls_amputated.to_string(),
            StatField::TopDomains => {
                if self.top_domains.is_empty() {
                    "none".to_string()
                } else {
                    self.top_domains
                        .iter()
                        .map(|(domain, count)| format!("{}: {}", domain, count))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            StatField::ServersWatched => self.servers_watched.to_string(),
        }
    }

    pub fn to_reply(&self) -> ReplyContent {
        STAT_LABELS
            .iter()
            .fold(ReplyContent::new("Amputation Stats", ""), |reply, (field, label)| {
                reply.with_field(*label, self.value(*field))
            })
    }
}
