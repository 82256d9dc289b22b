use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use tcgtracker_core::{
    decklist,
    filters::{filter_by_opponent, filter_by_result, filter_by_text, recent},
    resolve_deck, CardInput, stats, BackupInfo, DeckPatch, DeckRecord, HistoryEntry, ImportMode,
    ImportReport, MatchId, MatchPatch, MatchRecord, MatchResult, NewDeck, NewMatch, Repository,
    Snapshot,
};

use crate::api::dto::{
    CurrentDeckIn, DeckStatsOut, HealthOut, ImportQuery, MatchQuery, StatsOut, StatsQuery,
};
use crate::api::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn health(State(st): State<Arc<AppState>>) -> ApiResult<Json<HealthOut>> {
    Ok(Json(HealthOut {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        decks: st.repo.list_decks().await?.len(),
        matches: st.repo.list_matches(None).await?.len(),
    }))
}

// ===== Decks =====

pub async fn list_decks(State(st): State<Arc<AppState>>) -> ApiResult<Json<Vec<DeckRecord>>> {
    Ok(Json(st.repo.list_decks().await?))
}

pub async fn create_deck(
    State(st): State<Arc<AppState>>,
    body: Result<Json<NewDeck>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DeckRecord>)> {
    let Json(input) = body?;
    let d = st.repo.add_deck(input).await?;
    Ok((StatusCode::CREATED, Json(d)))
}

pub async fn get_deck(State(st): State<Arc<AppState>>, Path(sel): Path<String>) -> ApiResult<Json<DeckRecord>> {
    Ok(Json(resolve_deck(&*st.repo, &sel).await?))
}

pub async fn update_deck(
    State(st): State<Arc<AppState>>,
    Path(sel): Path<String>,
    body: Result<Json<DeckPatch>, JsonRejection>,
) -> ApiResult<Json<DeckRecord>> {
    let Json(patch) = body?;
    let d = resolve_deck(&*st.repo, &sel).await?;
    Ok(Json(st.repo.update_deck(d.id, patch).await?))
}

pub async fn delete_deck(State(st): State<Arc<AppState>>, Path(sel): Path<String>) -> ApiResult<StatusCode> {
    let d = resolve_deck(&*st.repo, &sel).await?;
    st.repo.delete_deck(d.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deck_composition(
    State(st): State<Arc<AppState>>,
    Path(sel): Path<String>,
) -> ApiResult<Json<stats::DeckComposition>> {
    let d = resolve_deck(&*st.repo, &sel).await?;
    Ok(Json(stats::deck_composition(&d)))
}

pub async fn upsert_card(
    State(st): State<Arc<AppState>>,
    Path(sel): Path<String>,
    body: Result<Json<CardInput>, JsonRejection>,
) -> ApiResult<Json<DeckRecord>> {
    let Json(card) = body?;
    let d = resolve_deck(&*st.repo, &sel).await?;
    Ok(Json(st.repo.upsert_card(d.id, card).await?))
}

pub async fn remove_card(
    State(st): State<Arc<AppState>>,
    Path((sel, card)): Path<(String, String)>,
) -> ApiResult<Json<DeckRecord>> {
    let d = resolve_deck(&*st.repo, &sel).await?;
    Ok(Json(st.repo.remove_card(d.id, card).await?))
}

pub async fn deck_list_text(
    State(st): State<Arc<AppState>>,
    Path(sel): Path<String>,
) -> ApiResult<([(header::HeaderName, &'static str); 1], String)> {
    let d = resolve_deck(&*st.repo, &sel).await?;
    let text = decklist::render(&d, Utc::now().date_naive());
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

pub async fn get_current_deck(State(st): State<Arc<AppState>>) -> ApiResult<Json<Option<DeckRecord>>> {
    Ok(Json(st.repo.current_deck().await?))
}

pub async fn set_current_deck(
    State(st): State<Arc<AppState>>,
    body: Result<Json<CurrentDeckIn>, JsonRejection>,
) -> ApiResult<Json<Option<DeckRecord>>> {
    let Json(input) = body?;
    let id = match input.deck {
        Some(sel) => Some(resolve_deck(&*st.repo, &sel).await?.id),
        None => None,
    };
    Ok(Json(st.repo.set_current_deck(id).await?))
}

pub async fn history(State(st): State<Arc<AppState>>) -> ApiResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(st.repo.history().await?))
}

// ===== Matches =====

pub async fn list_matches(
    State(st): State<Arc<AppState>>,
    Query(q): Query<MatchQuery>,
) -> ApiResult<Json<Vec<MatchRecord>>> {
    let deck_id = match q.deck {
        Some(sel) => Some(resolve_deck(&*st.repo, &sel).await?.id),
        None => None,
    };
    let mut v = st.repo.list_matches(deck_id).await?;
    if let Some(o) = q.opponent {
        v = filter_by_opponent(&v, &o);
    }
    if let Some(r) = q.result {
        v = filter_by_result(&v, r.parse::<MatchResult>()?);
    }
    if let Some(text) = q.q {
        v = filter_by_text(&v, &text);
    }
    if let Some(n) = q.limit {
        v = recent(&v, n);
    }
    Ok(Json(v))
}

pub async fn create_match(
    State(st): State<Arc<AppState>>,
    body: Result<Json<NewMatch>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MatchRecord>)> {
    let Json(input) = body?;
    let m = st.repo.add_match(input).await?;
    Ok((StatusCode::CREATED, Json(m)))
}

pub async fn get_match(State(st): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<MatchRecord>> {
    Ok(Json(st.repo.get_match(parse_id(&id)?).await?))
}

pub async fn update_match(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<MatchPatch>, JsonRejection>,
) -> ApiResult<Json<MatchRecord>> {
    let id = parse_id(&id)?;
    let Json(patch) = body?;
    Ok(Json(st.repo.update_match(id, patch).await?))
}

pub async fn delete_match(State(st): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    st.repo.delete_match(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== Stats =====

pub async fn overall_stats(
    State(st): State<Arc<AppState>>,
    Query(q): Query<StatsQuery>,
) -> ApiResult<Json<StatsOut>> {
    let deck_id = match q.deck {
        Some(sel) => Some(resolve_deck(&*st.repo, &sel).await?.id),
        None => None,
    };
    let matches = st.repo.list_matches(deck_id).await?;
    Ok(Json(StatsOut {
        summary: stats::summarize(&matches),
        first_player_advantage: stats::first_player_advantage(&matches),
        win_conditions: stats::win_condition_breakdown(&matches),
        streak: stats::current_streak(&matches),
    }))
}

pub async fn deck_stats(State(st): State<Arc<AppState>>) -> ApiResult<Json<Vec<DeckStatsOut>>> {
    let decks = st.repo.list_decks().await?;
    let matches = st.repo.list_matches(None).await?;
    let mut perf = stats::per_deck_performance(&matches);

    // Every deck appears, including ones with no games yet.
    let out = decks
        .into_iter()
        .map(|d| DeckStatsOut {
            deck_id: d.id,
            performance: perf.remove(&d.id).unwrap_or_default(),
            deck_name: d.name,
        })
        .collect();
    Ok(Json(out))
}

// ===== Snapshots and backups =====

pub async fn export(State(st): State<Arc<AppState>>) -> ApiResult<Json<Snapshot>> {
    Ok(Json(st.repo.export_snapshot().await?))
}

/// Body is a snapshot or a legacy export; `mode` defaults to replace.
pub async fn import(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ImportQuery>,
    body: Bytes,
) -> ApiResult<Json<ImportReport>> {
    let mode = match q.mode {
        Some(m) => m.parse::<ImportMode>()?,
        None => ImportMode::default(),
    };
    let snapshot = Snapshot::decode(&body).map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(Json(st.repo.import_snapshot(snapshot, mode).await?))
}

pub async fn list_backups(State(st): State<Arc<AppState>>) -> ApiResult<Json<Vec<BackupInfo>>> {
    Ok(Json(st.repo.list_backups().await?))
}

pub async fn create_backup(State(st): State<Arc<AppState>>) -> ApiResult<(StatusCode, Json<BackupInfo>)> {
    Ok((StatusCode::CREATED, Json(st.repo.backup().await?)))
}

fn parse_id(s: &str) -> Result<MatchId, ApiError> {
    Uuid::parse_str(s).map_err(|_| ApiError::BadRequest(format!("invalid match id: {s}")))
}
