use super::*;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::{
    error::ErrorCode,
    protocol::PageQuery,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex as StdMutex,
};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy)]
enum UpdateMode {
    Apply,
    Fail,
    ReturnEmpty,
}

#[derive(Clone)]
struct FixtureState {
    rows: Arc<StdMutex<Vec<Business>>>,
    fetch_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    last_update_ids: Arc<StdMutex<Vec<i64>>>,
    update_mode: UpdateMode,
}

fn make_rows(count: usize) -> Vec<Business> {
    (1..=count as i64)
        .map(|id| Business {
            id: BusinessId(id),
            name: format!("biz-{id:03}"),
            address: format!("{id} Main St"),
            city: "Springfield".to_string(),
            state: "CA".to_string(),
            zip: String::new(),
            phone: String::new(),
            email: String::new(),
        })
        .collect()
}

async fn fixture_list(
    State(state): State<FixtureState>,
    Query(q): Query<PageQuery>,
) -> Json<BusinessPage> {
    state.fetch_calls.fetch_add(1, Ordering::SeqCst);
    let rows = state.rows.lock().expect("rows");
    let total_count = rows.len() as i64;
    let start = (q.cursor.max(0) as usize).min(rows.len());
    let end = start.saturating_add(q.limit.max(0) as usize).min(rows.len());
    let items: Vec<Business> = rows[start..end].to_vec();
    let fetched = items.len() as i64;
    Json(BusinessPage {
        next_cursor: q.cursor + fetched,
        has_more: fetched == q.limit,
        total_count,
        items,
    })
}

async fn fixture_update(
    State(state): State<FixtureState>,
    Json(req): Json<BulkUpdateRequest>,
) -> Result<Json<BulkUpdateResponse>, (StatusCode, Json<ApiError>)> {
    state.update_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_update_ids.lock().expect("ids") = req.ids.iter().map(|id| id.0).collect();

    match state.update_mode {
        UpdateMode::Fail => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, "update failed")),
        )),
        UpdateMode::ReturnEmpty => Ok(Json(BulkUpdateResponse { items: Vec::new() })),
        UpdateMode::Apply => {
            let wanted: HashSet<BusinessId> = req.ids.iter().copied().collect();
            let mut rows = state.rows.lock().expect("rows");
            let mut items = Vec::new();
            for row in rows.iter_mut() {
                if wanted.contains(&row.id) {
                    set_field(row, req.field, &req.value);
                    items.push(row.clone());
                }
            }
            Ok(Json(BulkUpdateResponse { items }))
        }
    }
}

fn set_field(row: &mut Business, field: BusinessField, value: &str) {
    let slot = match field {
        BusinessField::Name => &mut row.name,
        BusinessField::Address => &mut row.address,
        BusinessField::City => &mut row.city,
        BusinessField::State => &mut row.state,
        BusinessField::Zip => &mut row.zip,
        BusinessField::Phone => &mut row.phone,
        BusinessField::Email => &mut row.email,
    };
    *slot = value.to_string();
}

async fn spawn_fixture(row_count: usize, update_mode: UpdateMode) -> (String, FixtureState) {
    let state = FixtureState {
        rows: Arc::new(StdMutex::new(make_rows(row_count))),
        fetch_calls: Arc::new(AtomicUsize::new(0)),
        update_calls: Arc::new(AtomicUsize::new(0)),
        last_update_ids: Arc::new(StdMutex::new(Vec::new())),
        update_mode,
    };
    let app = Router::new()
        .route("/api/businesses", get(fixture_list))
        .route("/api/businesses/bulk_update", post(fixture_update))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), state)
}

async fn controller_against(
    row_count: usize,
    page_size: i64,
    update_mode: UpdateMode,
) -> (DirectoryController, FixtureState) {
    let (url, state) = spawn_fixture(row_count, update_mode).await;
    let gateway = Arc::new(HttpDirectoryGateway::new(url));
    (DirectoryController::new(gateway, page_size), state)
}

#[tokio::test]
async fn three_sequential_loads_consume_the_whole_table() {
    let (mut controller, state) = controller_against(120, 50, UpdateMode::Apply).await;

    assert_eq!(controller.load_more().await, LoadOutcome::Appended(50));
    assert_eq!(controller.phase(), LoadPhase::Idle);
    assert_eq!(controller.cursor(), 50);

    assert_eq!(controller.load_more().await, LoadOutcome::Appended(50));
    assert_eq!(controller.phase(), LoadPhase::Idle);
    assert_eq!(controller.cursor(), 100);

    assert_eq!(controller.load_more().await, LoadOutcome::Appended(20));
    assert_eq!(controller.phase(), LoadPhase::Exhausted);
    assert_eq!(controller.cursor(), 120);

    assert_eq!(controller.loaded_count(), 120);
    assert_eq!(controller.total_count(), 120);
    assert_eq!(state.fetch_calls.load(Ordering::SeqCst), 3);

    let rows = controller.rows();
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn exhausted_controller_issues_no_further_fetches() {
    let (mut controller, state) = controller_against(70, 50, UpdateMode::Apply).await;

    controller.load_more().await;
    controller.load_more().await;
    assert_eq!(controller.phase(), LoadPhase::Exhausted);
    let fetches = state.fetch_calls.load(Ordering::SeqCst);

    // Further proximity signals are no-ops.
    assert_eq!(controller.load_more().await, LoadOutcome::Exhausted);
    assert_eq!(controller.load_more().await, LoadOutcome::Exhausted);
    assert_eq!(state.fetch_calls.load(Ordering::SeqCst), fetches);
    assert_eq!(controller.loaded_count(), 70);
}

#[test]
fn load_trigger_while_loading_is_ignored() {
    let gateway = Arc::new(HttpDirectoryGateway::new("http://127.0.0.1:1"));
    let mut controller = DirectoryController::new(gateway, 50);

    let ticket = controller.begin_load().expect("first trigger");
    assert_eq!(ticket.cursor, 0);
    assert_eq!(ticket.limit, 50);
    assert_eq!(controller.phase(), LoadPhase::Loading);
    assert!(controller.begin_load().is_none());

    let appended = controller.complete_load(BusinessPage {
        items: make_rows(3),
        next_cursor: 3,
        has_more: true,
        total_count: 3,
    });
    assert_eq!(appended, 3);
    assert_eq!(controller.phase(), LoadPhase::Idle);
}

#[test]
fn duplicate_and_stale_rows_are_dropped_on_append() {
    let gateway = Arc::new(HttpDirectoryGateway::new("http://127.0.0.1:1"));
    let mut controller = DirectoryController::new(gateway, 50);

    controller.begin_load().expect("load");
    controller.complete_load(BusinessPage {
        items: make_rows(5),
        next_cursor: 5,
        has_more: true,
        total_count: 10,
    });

    // Overlapping page: ids 4..=8, of which 4 and 5 are already loaded.
    let overlap: Vec<Business> = make_rows(8).into_iter().skip(3).collect();
    controller.begin_load().expect("load");
    let appended = controller.complete_load(BusinessPage {
        items: overlap,
        next_cursor: 8,
        has_more: true,
        total_count: 10,
    });

    assert_eq!(appended, 3);
    assert_eq!(controller.loaded_count(), 8);
    let rows = controller.rows();
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn failed_fetch_yields_empty_page_and_parks_controller() {
    // Bind and drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = Arc::new(HttpDirectoryGateway::new(format!("http://{addr}")));
    let mut controller = DirectoryController::new(gateway, 50);

    assert_eq!(controller.load_more().await, LoadOutcome::Appended(0));
    assert_eq!(controller.phase(), LoadPhase::Exhausted);
    assert!(controller.rows().is_empty());

    // A fresh attempt is an explicit reset, never automatic.
    controller.reset();
    assert_eq!(controller.phase(), LoadPhase::Idle);
    assert_eq!(controller.cursor(), 0);
}

#[tokio::test]
async fn bulk_update_applies_to_selection_and_clears_it() {
    let (mut controller, state) = controller_against(10, 50, UpdateMode::Apply).await;
    controller.load_more().await;
    assert_eq!(controller.loaded_count(), 10);

    assert!(controller.toggle_selection(BusinessId(3)));
    assert!(controller.toggle_selection(BusinessId(7)));
    assert_eq!(controller.selection_len(), 2);

    let updated = controller
        .bulk_update(BusinessField::State, "NY")
        .await
        .expect("bulk update");
    assert_eq!(updated, 2);

    assert_eq!(state.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*state.last_update_ids.lock().expect("ids"), vec![3, 7]);

    let rows = controller.rows();
    for row in rows {
        let expected = if row.id == BusinessId(3) || row.id == BusinessId(7) {
            "NY"
        } else {
            "CA"
        };
        assert_eq!(row.state, expected, "row {}", row.id.0);
    }
    assert_eq!(controller.selection_len(), 0);
}

#[tokio::test]
async fn bulk_update_with_empty_selection_issues_no_network_call() {
    let (mut controller, state) = controller_against(5, 50, UpdateMode::Apply).await;
    controller.load_more().await;

    let err = controller
        .bulk_update(BusinessField::State, "NY")
        .await
        .expect_err("should fail");
    assert!(matches!(err, BulkUpdateError::EmptySelection));
    assert_eq!(state.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bulk_update_with_blank_value_issues_no_network_call() {
    let (mut controller, state) = controller_against(5, 50, UpdateMode::Apply).await;
    controller.load_more().await;
    controller.select(BusinessId(1));

    let err = controller
        .bulk_update(BusinessField::City, "   ")
        .await
        .expect_err("should fail");
    assert!(matches!(err, BulkUpdateError::EmptyValue));
    assert_eq!(state.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(controller.selection_len(), 1);
}

#[tokio::test]
async fn failed_bulk_update_leaves_rows_and_selection_untouched() {
    let (mut controller, state) = controller_against(10, 50, UpdateMode::Fail).await;
    controller.load_more().await;
    controller.select(BusinessId(3));
    controller.select(BusinessId(7));

    let err = controller
        .bulk_update(BusinessField::State, "NY")
        .await
        .expect_err("should fail");
    assert!(matches!(err, BulkUpdateError::Request(_)));
    assert_eq!(state.update_calls.load(Ordering::SeqCst), 1);

    assert!(controller.rows().iter().all(|row| row.state == "CA"));
    assert_eq!(controller.selected_ids(), vec![BusinessId(3), BusinessId(7)]);
}

#[tokio::test]
async fn update_returning_no_rows_is_a_hard_error() {
    let (mut controller, _state) = controller_against(5, 50, UpdateMode::ReturnEmpty).await;
    controller.load_more().await;
    controller.select(BusinessId(2));

    let err = controller
        .bulk_update(BusinessField::Phone, "555-0100")
        .await
        .expect_err("should fail");
    assert!(matches!(err, BulkUpdateError::NoRowsReturned));
    assert_eq!(controller.selection_len(), 1);
}

#[test]
fn scroll_probe_fires_only_near_the_tail() {
    let mut probe = ScrollProbe::new(10, Duration::from_millis(0));

    // Viewport deep in the middle of 500 loaded rows.
    assert!(!probe.near_end(100, 40, 500));
    // Viewport within ten rows of the tail.
    assert!(probe.near_end(455, 40, 500));
    // Empty list counts as near the end (initial mount).
    assert!(probe.near_end(0, 40, 0));
}

#[test]
fn scroll_probe_throttles_rapid_signals() {
    let mut probe = ScrollProbe::new(10, Duration::from_millis(50));

    assert!(probe.near_end(90, 15, 100));
    assert!(!probe.near_end(91, 15, 100));
    assert!(!probe.near_end(92, 15, 100));

    std::thread::sleep(Duration::from_millis(60));
    assert!(probe.near_end(93, 15, 100));
}
