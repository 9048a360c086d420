//! Merged feed and cache eviction endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};

use calmerge_core::{CalendarChange, CalendarId};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calendars/{file}", get(merged_feed).post(merged_feed))
        .route("/calendars/{id}/cache", delete(evict_cache))
        .route("/changes", post(calendar_changed))
}

/// `{uuid}.ics` or `{uuid}.ical`
fn parse_feed_file(file: &str) -> Option<CalendarId> {
    let id = file.strip_suffix(".ics").or_else(|| file.strip_suffix(".ical"))?;
    id.parse().ok()
}

/// GET|POST /calendars/{uuid}.ics - Serve the merged calendar
async fn merged_feed(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_feed_file(&file)
        .ok_or_else(|| AppError::not_found(format!("No calendar at {file}")))?;

    let output = state.engine.merge_with_policy(id).await?;

    let mut response = output.ics.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/calendar; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{id}.ics\""))?,
    );
    if let Some(cache_control) = output.edge_cache.cache_control() {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_str(&cache_control)?);
    }

    Ok(response)
}

/// DELETE /calendars/{uuid}/cache - Evict the cached merge
async fn evict_cache(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: CalendarId = id
        .parse()
        .map_err(|_| AppError::not_found(format!("Invalid calendar id: {id}")))?;
    state.engine.invalidate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /changes - Notification that a calendar or one of its sources was edited
async fn calendar_changed(
    State(state): State<AppState>,
    Json(change): Json<CalendarChange>,
) -> Result<StatusCode, AppError> {
    state.engine.on_change(&change).await?;
    Ok(StatusCode::NO_CONTENT)
}
