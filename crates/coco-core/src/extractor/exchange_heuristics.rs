//! Per-exchange regex/keyword extractors, one small struct per fact type
//! (spec §4.H). None of these call an LLM — they're meant to run inline
//! after every turn, cheaply.

use regex::Regex;
use std::sync::OnceLock;

use super::FactExtractor;
use crate::episodic::Exchange;
use crate::facts::{FactType, NewFact};

fn context_window(text: &str, around: &str) -> String {
    let idx = text.find(around).unwrap_or(0);
    let start = idx.saturating_sub(200);
    let end = (idx + around.len() + 200).min(text.len());
    text.get(start..end).unwrap_or(text).to_string()
}

fn combined_text(exchange: &Exchange) -> String {
    format!("{}\n{}", exchange.user_text, exchange.agent_text)
}

macro_rules! regex_extractor {
    ($name:ident, $fact_type:expr, $pattern:expr) => {
        pub struct $name;

        impl FactExtractor for $name {
            fn extract(&self, exchange: &Exchange) -> Vec<NewFact> {
                static RE: OnceLock<Regex> = OnceLock::new();
                let re = RE.get_or_init(|| Regex::new($pattern).expect("valid regex"));
                let text = combined_text(exchange);

                re.find_iter(&text)
                    .map(|m| {
                        NewFact::new($fact_type, m.as_str().trim())
                            .with_context(context_window(&text, m.as_str()))
                            .with_episode(exchange.id)
                    })
                    .collect()
            }
        }
    };
}

regex_extractor!(
    CommandExtractor,
    FactType::Command,
    r"(?m)^(?:\$ .+|(?:git|docker|kubectl|ls|cd|pwd|mv|cp|rm|grep|find)\s+.+)$"
);

regex_extractor!(
    UrlExtractor,
    FactType::Url,
    r"https?://[^\s)>\]]+"
);

regex_extractor!(
    AppointmentExtractor,
    FactType::Appointment,
    r"(?i)(meeting with \w+ at [^\n.,]+|call at [^\n.,]+|appointment at [^\n.,]+ on [^\n.,]+)"
);

regex_extractor!(
    ContactExtractor,
    FactType::Contact,
    r"(?i)(email \w+ at [^\s]+|call \w+|reach out to \w+)"
);

regex_extractor!(
    PreferenceExtractor,
    FactType::Preference,
    r"(?i)(I prefer [^\n.,]+|I like [^\n.,]+|I always [^\n.,]+|I never [^\n.,]+|I don't [^\n.,]+|favorite [^\n.,]+)"
);

regex_extractor!(
    TaskExtractor,
    FactType::Task,
    r"(?i)(need to [^\n.,]+|I should [^\n.,]+|I must [^\n.,]+|remind me to [^\n.,]+|TODO:[^\n]+)"
);

regex_extractor!(
    NoteExtractor,
    FactType::Note,
    r"(?i)(Note:[^\n]+|FYI:[^\n]+|Important:[^\n]+|Remember:[^\n]+)"
);

regex_extractor!(
    FileExtractor,
    FactType::File,
    r"(?:[\w./-]+\.(?:rs|py|js|ts|md|json|toml|yaml|yml|txt|csv|pdf))\b"
);

regex_extractor!(
    ErrorExtractor,
    FactType::Error,
    r"(?i)(error: [^\n]+|exception: [^\n]+|failed with [^\n.,]+)"
);

regex_extractor!(
    ConfigExtractor,
    FactType::Config,
    r"(?i)([A-Z][A-Z0-9_]{2,}\s*=\s*\S+)"
);

regex_extractor!(
    LocationExtractor,
    FactType::Location,
    r"(?i)(at the [^\n.,]+|in [A-Z][\w\s]+(?:city|street|avenue)[^\n.,]*|near [^\n.,]+)"
);

regex_extractor!(
    HealthExtractor,
    FactType::Health,
    r"(?i)(allergic to [^\n.,]+|takes? medication [^\n.,]+|diagnosed with [^\n.,]+)"
);

regex_extractor!(
    FinancialExtractor,
    FactType::Financial,
    r"(?i)(\$[\d,]+(?:\.\d{2})?|budget of [^\n.,]+|invoice [^\n.,]+)"
);

regex_extractor!(
    RoutineExtractor,
    FactType::Routine,
    r"(?i)(every (?:morning|evening|day|week|monday|tuesday|wednesday|thursday|friday|saturday|sunday)[^\n.,]*)"
);

regex_extractor!(
    RecommendationExtractor,
    FactType::Recommendation,
    r"(?i)(you should try [^\n.,]+|I recommend [^\n.,]+|consider using [^\n.,]+)"
);

/// Communication mentions are the weakest signal of the set; only fire
/// on an explicit "sent"/"replied" verb plus a channel noun so this
/// doesn't fire on every sentence containing the word "message".
pub struct CommunicationExtractor;

impl FactExtractor for CommunicationExtractor {
    fn extract(&self, exchange: &Exchange) -> Vec<NewFact> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"(?i)(sent|replied to|forwarded) (?:an? )?(email|message|text) (?:to|from) [^\n.,]+")
                .expect("valid regex")
        });
        let text = combined_text(exchange);
        re.find_iter(&text)
            .map(|m| {
                NewFact::new(FactType::Communication, m.as_str().trim())
                    .with_context(context_window(&text, m.as_str()))
                    .with_episode(exchange.id)
            })
            .collect()
    }
}

pub fn default_exchange_extractors() -> Vec<Box<dyn FactExtractor>> {
    vec![
        Box::new(CommandExtractor),
        Box::new(UrlExtractor),
        Box::new(AppointmentExtractor),
        Box::new(ContactExtractor),
        Box::new(PreferenceExtractor),
        Box::new(TaskExtractor),
        Box::new(NoteExtractor),
        Box::new(FileExtractor),
        Box::new(ErrorExtractor),
        Box::new(ConfigExtractor),
        Box::new(LocationExtractor),
        Box::new(HealthExtractor),
        Box::new(FinancialExtractor),
        Box::new(RoutineExtractor),
        Box::new(RecommendationExtractor),
        Box::new(CommunicationExtractor),
    ]
}
