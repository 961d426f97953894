use shared::{
    domain::{Business, BusinessField, BusinessId},
    error::{ApiError, ErrorCode},
    protocol::BusinessPage,
};
use storage::Storage;
use tracing::{debug, warn};

const MAX_PAGE_SIZE: i64 = 500;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Serves one page of the directory starting at `cursor`.
///
/// `has_more` is derived from last-page-fullness: a page shorter than the
/// requested limit means the end of the table was reached. The total count is
/// returned alongside but is only an advisory snapshot; it is never the
/// source of truth for pagination.
pub async fn fetch_business_page(
    ctx: &ApiContext,
    cursor: i64,
    limit: i64,
) -> Result<BusinessPage, ApiError> {
    if cursor < 0 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "cursor must be non-negative",
        ));
    }
    if limit <= 0 {
        return Err(ApiError::new(ErrorCode::Validation, "limit must be positive"));
    }
    let limit = limit.min(MAX_PAGE_SIZE);

    let total_count = ctx.storage.count_businesses().await.map_err(internal)?;
    let items = ctx
        .storage
        .list_businesses(cursor, limit)
        .await
        .map_err(internal)?;

    let fetched = items.len() as i64;
    let page = BusinessPage {
        next_cursor: cursor + fetched,
        has_more: fetched == limit,
        total_count,
        items,
    };
    debug!(
        cursor,
        limit,
        fetched,
        total_count,
        has_more = page.has_more,
        "served business page"
    );
    Ok(page)
}

/// Applies one field/value pair to every row in `ids` and returns the
/// updated rows.
///
/// Ids unknown to the server are dropped from the filter up front. An update
/// that goes through but returns no rows is treated as a hard internal
/// error rather than a silent success.
pub async fn bulk_update_businesses(
    ctx: &ApiContext,
    field: BusinessField,
    value: &str,
    ids: &[BusinessId],
) -> Result<Vec<Business>, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "bulk update requires at least one selected row",
        ));
    }

    let known_ids = ctx
        .storage
        .existing_business_ids(ids)
        .await
        .map_err(internal)?;
    if known_ids.is_empty() {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            "none of the selected rows exist",
        ));
    }
    if known_ids.len() < ids.len() {
        warn!(
            requested = ids.len(),
            known = known_ids.len(),
            "bulk update filter contains ids unknown to the server"
        );
    }

    let updated = ctx
        .storage
        .update_business_field(field, value, &known_ids)
        .await
        .map_err(internal)?;
    if updated.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Internal,
            "update succeeded but returned no rows",
        ));
    }
    Ok(updated)
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
