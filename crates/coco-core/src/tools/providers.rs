//! Provider capability traits (supplemented, per REDESIGN FLAGS)
//!
//! Twitter, email, and Google Workspace clients are explicitly out of
//! scope (they're real external SDKs). What *is* in scope is the seam:
//! a small trait per external service, each defaulting to an
//! `Unavailable` stand-in so the core never depends on a real network
//! client while still exposing a concrete extension point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CocoError;

/// A snapshot of an external service's rate-limit state, handed to
/// scheduler templates so they can short-circuit before attempting a
/// call (spec §4.K).
#[derive(Debug, Clone)]
pub struct RateLimitSnapshot {
    pub service: String,
    pub remaining: u32,
    pub window_resets_at: DateTime<Utc>,
}

impl RateLimitSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 && Utc::now() < self.window_resets_at
    }
}

pub trait RateLimiter: Send + Sync {
    fn snapshot(&self, service: &str) -> RateLimitSnapshot;
}

/// Always reports full quota; used where no real limiter is wired up.
pub struct UnlimitedRateLimiter;

impl RateLimiter for UnlimitedRateLimiter {
    fn snapshot(&self, service: &str) -> RateLimitSnapshot {
        RateLimitSnapshot {
            service: service.to_string(),
            remaining: u32::MAX,
            window_resets_at: Utc::now(),
        }
    }
}

fn unavailable(service: &str) -> CocoError {
    CocoError::ExternalFailure(format!("{service} provider not configured"))
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), CocoError>;
    async fn check_inbox(&self) -> Result<Vec<String>, CocoError>;
    fn is_available(&self) -> bool {
        false
    }
}

pub struct UnavailableEmailProvider;

#[async_trait]
impl EmailProvider for UnavailableEmailProvider {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), CocoError> {
        Err(unavailable("email"))
    }
    async fn check_inbox(&self) -> Result<Vec<String>, CocoError> {
        Err(unavailable("email"))
    }
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<String>, CocoError>;
    async fn create_event(&self, title: &str, at: DateTime<Utc>) -> Result<String, CocoError>;
    fn is_available(&self) -> bool {
        false
    }
}

pub struct UnavailableCalendarProvider;

#[async_trait]
impl CalendarProvider for UnavailableCalendarProvider {
    async fn list_events(&self, _from: DateTime<Utc>, _to: DateTime<Utc>) -> Result<Vec<String>, CocoError> {
        Err(unavailable("calendar"))
    }
    async fn create_event(&self, _title: &str, _at: DateTime<Utc>) -> Result<String, CocoError> {
        Err(unavailable("calendar"))
    }
}

/// Covers docs, sheets, and drive: all three are "create/read/update a
/// named remote document" shaped (spec §6.2).
#[async_trait]
pub trait DriveProvider: Send + Sync {
    async fn create(&self, kind: &str, name: &str) -> Result<String, CocoError>;
    async fn read(&self, id: &str) -> Result<String, CocoError>;
    async fn update(&self, id: &str, content: &str) -> Result<(), CocoError>;
    fn is_available(&self) -> bool {
        false
    }
}

pub struct UnavailableDriveProvider;

#[async_trait]
impl DriveProvider for UnavailableDriveProvider {
    async fn create(&self, _kind: &str, _name: &str) -> Result<String, CocoError> {
        Err(unavailable("drive"))
    }
    async fn read(&self, _id: &str) -> Result<String, CocoError> {
        Err(unavailable("drive"))
    }
    async fn update(&self, _id: &str, _content: &str) -> Result<(), CocoError> {
        Err(unavailable("drive"))
    }
}

#[async_trait]
pub trait TwitterProvider: Send + Sync {
    async fn post(&self, text: &str) -> Result<String, CocoError>;
    async fn search(&self, query: &str) -> Result<Vec<String>, CocoError>;
    async fn thread(&self, posts: &[String]) -> Result<Vec<String>, CocoError>;
    fn is_available(&self) -> bool {
        false
    }
}

pub struct UnavailableTwitterProvider;

#[async_trait]
impl TwitterProvider for UnavailableTwitterProvider {
    async fn post(&self, _text: &str) -> Result<String, CocoError> {
        Err(unavailable("twitter"))
    }
    async fn search(&self, _query: &str) -> Result<Vec<String>, CocoError> {
        Err(unavailable("twitter"))
    }
    async fn thread(&self, _posts: &[String]) -> Result<Vec<String>, CocoError> {
        Err(unavailable("twitter"))
    }
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, CocoError>;
    fn is_available(&self) -> bool {
        false
    }
}

pub struct UnavailableWebSearchProvider;

#[async_trait]
impl WebSearchProvider for UnavailableWebSearchProvider {
    async fn search(&self, _query: &str) -> Result<Vec<String>, CocoError> {
        Err(unavailable("web_search"))
    }
}
