//! Per-tool fact extractors (spec §4.H): each of the 15 fact-extracting
//! tools gets its own small extractor emitting 2-3 who/what/where/when
//! facts from the tool's input and result summary. Looked up by name in
//! a registry rather than matched in a branch (REDESIGN FLAGS).

use std::collections::HashMap;

use serde_json::Value;

use super::ToolFactExtractor;
use crate::episodic::{Exchange, ToolCallRecord};
use crate::facts::{FactType, NewFact};

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn fact(fact_type: FactType, content: impl Into<String>, exchange: &Exchange) -> NewFact {
    NewFact::new(fact_type, content).with_episode(exchange.id)
}

macro_rules! tool_extractor {
    ($name:ident, $body:expr) => {
        pub struct $name;
        impl ToolFactExtractor for $name {
            fn extract(&self, call: &ToolCallRecord, exchange: &Exchange) -> Vec<NewFact> {
                ($body)(call, exchange)
            }
        }
    };
}

tool_extractor!(EmailToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(to) = str_field(&call.input, "to") {
        facts.push(fact(FactType::Contact, format!("emailed {to}"), ex));
    }
    if let Some(subject) = str_field(&call.input, "subject") {
        facts.push(fact(FactType::Communication, format!("email subject: {subject}"), ex));
    }
    facts
});

tool_extractor!(DocsToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(title) = str_field(&call.input, "title").or_else(|| str_field(&call.input, "name")) {
        facts.push(fact(FactType::File, format!("doc: {title}"), ex));
    }
    facts
});

tool_extractor!(SheetsToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(name) = str_field(&call.input, "name") {
        facts.push(fact(FactType::File, format!("spreadsheet: {name}"), ex));
    }
    facts
});

tool_extractor!(ImagesToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    vec![
        fact(FactType::ToolUse, format!("used {}", call.name), ex),
        fact(FactType::Note, call.result_summary.clone(), ex),
    ]
});

tool_extractor!(VideosToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    vec![
        fact(FactType::ToolUse, format!("used {}", call.name), ex),
        fact(FactType::Note, call.result_summary.clone(), ex),
    ]
});

tool_extractor!(FilesToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(path) = str_field(&call.input, "path") {
        facts.push(fact(FactType::File, path.to_string(), ex));
    }
    facts
});

tool_extractor!(SearchToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(query) = str_field(&call.input, "q").or_else(|| str_field(&call.input, "query")) {
        facts.push(fact(FactType::Note, format!("searched for: {query}"), ex));
    }
    facts
});

tool_extractor!(CalendarToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(title) = str_field(&call.input, "title") {
        facts.push(fact(FactType::Appointment, title.to_string(), ex));
    }
    if let Some(when) = str_field(&call.input, "time").or_else(|| str_field(&call.input, "start")) {
        facts.push(fact(FactType::Appointment, format!("scheduled at {when}"), ex));
    }
    facts
});

tool_extractor!(UploadsToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(path) = str_field(&call.input, "path") {
        facts.push(fact(FactType::File, format!("uploaded {path}"), ex));
    }
    facts
});

tool_extractor!(DownloadsToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(path) = str_field(&call.input, "path").or_else(|| str_field(&call.input, "url")) {
        facts.push(fact(FactType::File, format!("downloaded {path}"), ex));
    }
    facts
});

tool_extractor!(FoldersToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(path) = str_field(&call.input, "path") {
        facts.push(fact(FactType::File, format!("folder: {path}"), ex));
    }
    facts
});

tool_extractor!(ReadingToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(path) = str_field(&call.input, "path") {
        facts.push(fact(FactType::File, format!("read {path}"), ex));
    }
    facts
});

tool_extractor!(AnalysisToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    vec![
        fact(FactType::ToolUse, format!("used {}", call.name), ex),
        fact(FactType::Note, format!("analysis result: {}", call.result_summary), ex),
    ]
});

tool_extractor!(ShellToolExtractor, |call: &ToolCallRecord, ex: &Exchange| {
    let mut facts = vec![fact(FactType::ToolUse, format!("used {}", call.name), ex)];
    if let Some(command) = str_field(&call.input, "command") {
        facts.push(fact(FactType::Command, command.to_string(), ex));
    }
    facts
});

/// Fallback for any tool with no registered extractor: at most one
/// generic `tool_use` fact (spec §4.H).
pub struct GenericToolUseExtractor;

impl ToolFactExtractor for GenericToolUseExtractor {
    fn extract(&self, call: &ToolCallRecord, exchange: &Exchange) -> Vec<NewFact> {
        vec![fact(FactType::ToolUse, format!("used {}", call.name), exchange)]
    }
}

pub fn default_tool_registry() -> HashMap<String, Box<dyn ToolFactExtractor>> {
    let mut registry: HashMap<String, Box<dyn ToolFactExtractor>> = HashMap::new();
    registry.insert("send_email".to_string(), Box::new(EmailToolExtractor));
    registry.insert("check_emails".to_string(), Box::new(EmailToolExtractor));
    registry.insert("read_email_content".to_string(), Box::new(EmailToolExtractor));
    registry.insert("create_doc".to_string(), Box::new(DocsToolExtractor));
    registry.insert("read_doc".to_string(), Box::new(DocsToolExtractor));
    registry.insert("update_doc".to_string(), Box::new(DocsToolExtractor));
    registry.insert("create_sheet".to_string(), Box::new(SheetsToolExtractor));
    registry.insert("read_sheet".to_string(), Box::new(SheetsToolExtractor));
    registry.insert("update_sheet".to_string(), Box::new(SheetsToolExtractor));
    registry.insert("generate_image".to_string(), Box::new(ImagesToolExtractor));
    registry.insert("generate_video".to_string(), Box::new(VideosToolExtractor));
    registry.insert("write_file".to_string(), Box::new(FilesToolExtractor));
    registry.insert("read_file".to_string(), Box::new(ReadingToolExtractor));
    registry.insert("list_dir".to_string(), Box::new(FoldersToolExtractor));
    registry.insert("search_code".to_string(), Box::new(SearchToolExtractor));
    registry.insert("search_web".to_string(), Box::new(SearchToolExtractor));
    registry.insert("list_events".to_string(), Box::new(CalendarToolExtractor));
    registry.insert("create_event".to_string(), Box::new(CalendarToolExtractor));
    registry.insert("upload_file".to_string(), Box::new(UploadsToolExtractor));
    registry.insert("download_file".to_string(), Box::new(DownloadsToolExtractor));
    registry.insert("run_python_snippet".to_string(), Box::new(AnalysisToolExtractor));
    registry.insert("run_command".to_string(), Box::new(ShellToolExtractor));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> Exchange {
        Exchange::new(1, "do it", "done")
    }

    #[test]
    fn email_extractor_emits_contact_and_communication_facts() {
        let call = ToolCallRecord {
            name: "send_email".to_string(),
            input: serde_json::json!({"to": "bob@example.com", "subject": "lunch"}),
            result_summary: "sent".to_string(),
        };
        let facts = EmailToolExtractor.extract(&call, &exchange());
        assert_eq!(facts.len(), 3);
        assert!(facts.iter().any(|f| f.fact_type == FactType::Contact));
        assert!(facts.iter().any(|f| f.fact_type == FactType::Communication));
    }

    #[test]
    fn calendar_extractor_emits_appointment_facts() {
        let call = ToolCallRecord {
            name: "create_event".to_string(),
            input: serde_json::json!({"title": "Dentist", "time": "3pm"}),
            result_summary: "created".to_string(),
        };
        let facts = CalendarToolExtractor.extract(&call, &exchange());
        assert!(facts.iter().filter(|f| f.fact_type == FactType::Appointment).count() >= 2);
    }

    #[test]
    fn generic_fallback_emits_single_fact() {
        let call = ToolCallRecord {
            name: "unregistered_tool".to_string(),
            input: serde_json::json!({}),
            result_summary: "ok".to_string(),
        };
        let facts = GenericToolUseExtractor.extract(&call, &exchange());
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact_type, FactType::ToolUse);
    }

    #[test]
    fn default_registry_covers_fifteen_tool_categories() {
        let registry = default_tool_registry();
        let distinct_extractors = [
            "send_email", "create_doc", "create_sheet", "generate_image", "generate_video",
            "write_file", "read_file", "list_dir", "search_web", "create_event",
            "upload_file", "download_file", "run_python_snippet", "run_command",
        ];
        for name in distinct_extractors {
            assert!(registry.contains_key(name), "missing extractor for {name}");
        }
    }
}
