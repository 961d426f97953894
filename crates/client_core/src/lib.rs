use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{Business, BusinessField, BusinessId},
    error::ApiError,
    protocol::{BulkUpdateRequest, BulkUpdateResponse, BusinessPage},
};
use thiserror::Error;
use tracing::{debug, warn};

/// Seam between the list/mutation state machines and the directory server.
#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    /// One paginated range query. Infallible by contract: transport and
    /// server failures collapse into an empty page with `has_more = false`.
    /// A single attempt per call; no retry, no backoff.
    async fn fetch_page(&self, cursor: i64, limit: i64) -> BusinessPage;

    /// One update-by-identifier-list call returning the updated rows. Unlike
    /// `fetch_page` this propagates failures, because the mutation handler
    /// surfaces them to the user.
    async fn update_field(
        &self,
        field: BusinessField,
        value: &str,
        ids: &[BusinessId],
    ) -> Result<Vec<Business>>;
}

/// HTTP gateway against the directory server's `/api/businesses` endpoints.
pub struct HttpDirectoryGateway {
    http: Client,
    server_url: String,
}

impl HttpDirectoryGateway {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
        }
    }

    async fn try_fetch_page(&self, cursor: i64, limit: i64) -> Result<BusinessPage> {
        let page = self
            .http
            .get(format!("{}/api/businesses", self.server_url))
            .query(&[("cursor", cursor), ("limit", limit)])
            .send()
            .await
            .context("page request failed")?
            .error_for_status()
            .context("page request rejected")?
            .json::<BusinessPage>()
            .await
            .context("page response was not valid JSON")?;
        Ok(page)
    }
}

#[async_trait]
impl BusinessDirectory for HttpDirectoryGateway {
    async fn fetch_page(&self, cursor: i64, limit: i64) -> BusinessPage {
        match self.try_fetch_page(cursor, limit).await {
            Ok(page) => page,
            Err(error) => {
                warn!(cursor, limit, %error, "page fetch failed; serving empty page");
                BusinessPage::empty(cursor)
            }
        }
    }

    async fn update_field(
        &self,
        field: BusinessField,
        value: &str,
        ids: &[BusinessId],
    ) -> Result<Vec<Business>> {
        let response = self
            .http
            .post(format!("{}/api/businesses/bulk_update", self.server_url))
            .json(&BulkUpdateRequest {
                field,
                value: value.to_string(),
                ids: ids.to_vec(),
            })
            .send()
            .await
            .context("bulk update request failed")?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(body) => body.message,
                Err(_) => format!("server returned {status}"),
            };
            return Err(anyhow!("bulk update rejected: {message}"));
        }

        let body: BulkUpdateResponse = response
            .json()
            .await
            .context("bulk update response was not valid JSON")?;
        Ok(body.items)
    }
}

/// Load-side state of the incremental list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// No request in flight and the server may have more rows.
    Idle,
    /// A page fetch is in flight; further triggers are ignored.
    Loading,
    /// The server reported the end of the table; no automatic fetches.
    Exhausted,
}

/// Proof that the controller reserved the in-flight slot. Holding one of
/// these is the only way to run a fetch on the controller's behalf.
#[derive(Debug)]
pub struct LoadTicket {
    pub cursor: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched; this many rows were appended.
    Appended(usize),
    /// Another load was already in flight; the trigger was dropped.
    InFlight,
    /// The table end was already reached; no request was issued.
    Exhausted,
}

#[derive(Debug, Error)]
pub enum BulkUpdateError {
    #[error("no rows are selected")]
    EmptySelection,
    #[error("update value must not be empty")]
    EmptyValue,
    #[error("update succeeded but returned no rows")]
    NoRowsReturned,
    #[error("bulk update request failed: {0}")]
    Request(anyhow::Error),
}

/// Owns the loaded-rows list, the cursor, the load state machine, and the
/// selection set. One instance per grid; all mutation goes through its own
/// methods, never through shared ambient state.
pub struct DirectoryController {
    directory: Arc<dyn BusinessDirectory>,
    page_size: i64,
    rows: Vec<Business>,
    cursor: i64,
    total_count: i64,
    phase: LoadPhase,
    selection: HashSet<BusinessId>,
}

impl DirectoryController {
    pub fn new(directory: Arc<dyn BusinessDirectory>, page_size: i64) -> Self {
        Self {
            directory,
            page_size: page_size.max(1),
            rows: Vec::new(),
            cursor: 0,
            total_count: 0,
            phase: LoadPhase::Idle,
            selection: HashSet::new(),
        }
    }

    pub fn rows(&self) -> &[Business] {
        &self.rows
    }

    pub fn loaded_count(&self) -> usize {
        self.rows.len()
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// Reserves the single in-flight slot. Returns `None` while a load is
    /// already pending or the table is exhausted, which is what makes
    /// overlapping proximity triggers no-ops.
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        match self.phase {
            LoadPhase::Idle => {
                self.phase = LoadPhase::Loading;
                Some(LoadTicket {
                    cursor: self.cursor,
                    limit: self.page_size,
                })
            }
            LoadPhase::Loading | LoadPhase::Exhausted => None,
        }
    }

    /// Applies a fetched page and releases the in-flight slot. Runs on every
    /// completion path, success or empty-failure page alike; there is no
    /// cancellation, so a late page still lands here.
    pub fn complete_load(&mut self, page: BusinessPage) -> usize {
        let appended = self.append_rows(page.items);
        self.cursor = self.cursor.max(page.next_cursor);
        if page.total_count > 0 {
            self.total_count = page.total_count;
        }
        self.phase = if page.has_more {
            LoadPhase::Idle
        } else {
            LoadPhase::Exhausted
        };
        appended
    }

    /// One full load step: reserve the slot, fetch, apply. The trigger may
    /// be the initial mount or a proximity signal; the caller does not need
    /// to care which.
    pub async fn load_more(&mut self) -> LoadOutcome {
        let ticket = match self.phase {
            LoadPhase::Loading => return LoadOutcome::InFlight,
            LoadPhase::Exhausted => return LoadOutcome::Exhausted,
            LoadPhase::Idle => match self.begin_load() {
                Some(ticket) => ticket,
                None => return LoadOutcome::InFlight,
            },
        };

        let page = self
            .directory
            .fetch_page(ticket.cursor, ticket.limit)
            .await;
        LoadOutcome::Appended(self.complete_load(page))
    }

    /// Starts over from an empty list. This is the explicit user-triggered
    /// retry path after a failed fetch parked the controller in `Exhausted`.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.selection.clear();
        self.cursor = 0;
        self.total_count = 0;
        self.phase = LoadPhase::Idle;
    }

    /// Keeps the id-ascending / no-duplicate invariant: rows not strictly
    /// above the current tail are dropped rather than trusted.
    fn append_rows(&mut self, items: Vec<Business>) -> usize {
        let mut appended = 0;
        let mut last_id = self.rows.last().map(|row| row.id);
        for item in items {
            if last_id.is_some_and(|last| item.id <= last) {
                debug!(id = item.id.0, "dropping out-of-order or duplicate row");
                continue;
            }
            last_id = Some(item.id);
            self.rows.push(item);
            appended += 1;
        }
        appended
    }

    pub fn is_selected(&self, id: BusinessId) -> bool {
        self.selection.contains(&id)
    }

    /// Flips one row's membership in the selection set; returns the new
    /// state.
    pub fn toggle_selection(&mut self, id: BusinessId) -> bool {
        if self.selection.remove(&id) {
            false
        } else {
            self.selection.insert(id);
            true
        }
    }

    pub fn select(&mut self, id: BusinessId) {
        self.selection.insert(id);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    pub fn selected_ids(&self) -> Vec<BusinessId> {
        let mut ids: Vec<BusinessId> = self.selection.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Applies one field/value pair to every selected row via a single
    /// server call.
    ///
    /// Validation failures block before any network traffic. On success the
    /// returned rows are merged into the loaded list by id (rows the server
    /// did not return stay as they were) and the selection is cleared. On
    /// any failure the loaded rows and the selection are left untouched.
    pub async fn bulk_update(
        &mut self,
        field: BusinessField,
        value: &str,
    ) -> Result<usize, BulkUpdateError> {
        if self.selection.is_empty() {
            return Err(BulkUpdateError::EmptySelection);
        }
        if value.trim().is_empty() {
            return Err(BulkUpdateError::EmptyValue);
        }

        let ids = self.selected_ids();
        let updated = self
            .directory
            .update_field(field, value, &ids)
            .await
            .map_err(BulkUpdateError::Request)?;
        if updated.is_empty() {
            return Err(BulkUpdateError::NoRowsReturned);
        }

        let mut merged = 0;
        for row in &mut self.rows {
            if let Some(fresh) = updated.iter().find(|u| u.id == row.id) {
                *row = fresh.clone();
                merged += 1;
            }
        }
        debug!(
            requested = ids.len(),
            returned = updated.len(),
            merged,
            "bulk update merged into loaded rows"
        );
        self.selection.clear();
        Ok(updated.len())
    }
}

/// Scroll-position variant of the "near the end of rendered content"
/// signal, throttled so fast scrolling cannot fire a burst of triggers.
/// The controller's single-flight guard is the backstop; this just keeps
/// redundant wakeups off the event loop.
pub struct ScrollProbe {
    threshold_rows: usize,
    min_interval: Duration,
    last_fired: Option<Instant>,
}

impl ScrollProbe {
    pub fn new(threshold_rows: usize, min_interval: Duration) -> Self {
        Self {
            threshold_rows,
            min_interval,
            last_fired: None,
        }
    }

    /// True when the viewport is within `threshold_rows` of the loaded tail
    /// and the throttle window has elapsed.
    pub fn near_end(
        &mut self,
        first_visible: usize,
        viewport_rows: usize,
        loaded_rows: usize,
    ) -> bool {
        let visible_end = first_visible.saturating_add(viewport_rows);
        let remaining = loaded_rows.saturating_sub(visible_end);
        if remaining > self.threshold_rows {
            return false;
        }
        if let Some(last) = self.last_fired {
            if last.elapsed() < self.min_interval {
                return false;
            }
        }
        self.last_fired = Some(Instant::now());
        true
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
