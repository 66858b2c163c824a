//! Integration tests for the move-table operation.

mod common;

use common::{
    area, assignment_of, booking_at, d, resolver, table_in, window, FakeStore,
};
use backoffice_service::models::BookingStatus;
use backoffice_service::services::availability::{AssignmentStore, MoveTableError};
use uuid::Uuid;

#[tokio::test]
async fn move_to_a_free_table_replaces_the_assignment() {
    let store = FakeStore::new();
    let floor = area();
    let table3 = table_in("3", 4, floor);
    let table5 = table_in("5", 6, floor);
    let (table3_id, table5_id) = (table3.table_id, table5.table_id);

    let mut booking = booking_at(d(2025, 7, 4), (19, 0), 4, BookingStatus::Confirmed);
    booking.duration_minutes = Some(120);
    let booking_id = booking.booking_id;
    let expected_window = window(d(2025, 7, 4), (19, 0), (21, 0));

    store.with(|data| {
        data.tables.push(table3);
        data.tables.push(table5);
        data.assignments
            .push(assignment_of(booking_id, table3_id, expected_window));
        data.bookings.push(booking);
    });

    let svc = resolver(&store);

    let options = svc.available_tables(booking_id).await.unwrap();
    assert!(options.tables.iter().any(|t| t.table_id == table5_id));

    let outcome = svc.move_table(booking_id, table5_id).await.unwrap();
    assert_eq!(outcome.table.table_id, table5_id);
    assert_eq!(outcome.window, expected_window);

    store.with(|data| {
        assert_eq!(data.assignments.len(), 1);
        let assignment = &data.assignments[0];
        assert_eq!(assignment.table_id, table5_id);
        assert_eq!(assignment.booking_id, booking_id);
        assert_eq!(assignment.starts_at, expected_window.start);
        assert_eq!(assignment.ends_at, expected_window.end);
    });
}

#[tokio::test]
async fn commit_time_conflict_leaves_prior_assignments_intact() {
    let store = FakeStore::new();
    let floor = area();
    let table3 = table_in("3", 4, floor);
    let table5 = table_in("5", 6, floor);
    let (table3_id, table5_id) = (table3.table_id, table5.table_id);

    let booking = booking_at(d(2025, 7, 4), (19, 0), 4, BookingStatus::Confirmed);
    let rival = booking_at(d(2025, 7, 4), (19, 30), 4, BookingStatus::Confirmed);
    let (booking_id, rival_id) = (booking.booking_id, rival.booking_id);
    let move_window = window(d(2025, 7, 4), (19, 0), (21, 0));

    let original = assignment_of(booking_id, table3_id, move_window);
    let original_id = original.assignment_id;

    store.with(|data| {
        data.tables.push(table3);
        data.tables.push(table5);
        data.assignments.push(original);
        // The rival grabbed table 5 between our availability check and the
        // write - exactly the race the constraint closes.
        data.assignments.push(assignment_of(
            rival_id,
            table5_id,
            window(d(2025, 7, 4), (19, 30), (21, 30)),
        ));
        data.bookings.push(booking);
        data.bookings.push(rival);
    });

    let err = store
        .reassign(booking_id, table5_id, &move_window, &[original_id])
        .await
        .unwrap_err();
    assert!(matches!(err, MoveTableError::TableNoLongerAvailable));

    store.with(|data| {
        let mine: Vec<_> = data
            .assignments
            .iter()
            .filter(|a| a.booking_id == booking_id)
            .collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].assignment_id, original_id);
        assert_eq!(mine[0].table_id, table3_id);
    });
}

#[tokio::test]
async fn changed_assignment_set_is_reported_stale() {
    let store = FakeStore::new();
    let floor = area();
    let table3 = table_in("3", 4, floor);
    let table5 = table_in("5", 6, floor);
    let (table3_id, table5_id) = (table3.table_id, table5.table_id);

    let booking = booking_at(d(2025, 7, 4), (19, 0), 4, BookingStatus::Confirmed);
    let booking_id = booking.booking_id;
    let move_window = window(d(2025, 7, 4), (19, 0), (21, 0));

    store.with(|data| {
        data.tables.push(table3);
        data.tables.push(table5);
        data.assignments
            .push(assignment_of(booking_id, table3_id, move_window));
        data.bookings.push(booking);
    });

    // Expectation captured before another writer touched the assignments.
    let err = store
        .reassign(booking_id, table5_id, &move_window, &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, MoveTableError::StaleAssignmentState));

    store.with(|data| {
        assert_eq!(data.assignments.len(), 1);
        assert_eq!(data.assignments[0].table_id, table3_id);
    });
}

#[tokio::test]
async fn same_table_move_refreshes_the_window() {
    let store = FakeStore::new();
    let floor = area();
    let table5 = table_in("5", 6, floor);
    let table5_id = table5.table_id;

    let mut booking = booking_at(d(2025, 7, 4), (19, 0), 4, BookingStatus::Confirmed);
    booking.duration_minutes = Some(120);
    let booking_id = booking.booking_id;

    store.with(|data| {
        data.tables.push(table5);
        // Assignment carries an outdated, narrower window.
        data.assignments.push(assignment_of(
            booking_id,
            table5_id,
            window(d(2025, 7, 4), (19, 0), (20, 0)),
        ));
        data.bookings.push(booking);
    });

    let outcome = resolver(&store)
        .move_table(booking_id, table5_id)
        .await
        .unwrap();
    assert_eq!(outcome.table.table_id, table5_id);

    let refreshed = window(d(2025, 7, 4), (19, 0), (21, 0));
    store.with(|data| {
        assert_eq!(data.assignments.len(), 1);
        assert_eq!(data.assignments[0].starts_at, refreshed.start);
        assert_eq!(data.assignments[0].ends_at, refreshed.end);
    });
}

#[tokio::test]
async fn multi_table_combination_collapses_to_the_target() {
    let store = FakeStore::new();
    let floor = area();
    let table1 = table_in("1", 4, floor);
    let table2 = table_in("2", 4, floor);
    let (table1_id, table2_id) = (table1.table_id, table2.table_id);

    let booking = booking_at(d(2025, 7, 4), (19, 0), 4, BookingStatus::Confirmed);
    let booking_id = booking.booking_id;
    let move_window = window(d(2025, 7, 4), (19, 0), (20, 30));

    store.with(|data| {
        data.tables.push(table1);
        data.tables.push(table2);
        data.assignments
            .push(assignment_of(booking_id, table1_id, move_window));
        data.assignments
            .push(assignment_of(booking_id, table2_id, move_window));
        data.bookings.push(booking);
    });

    resolver(&store)
        .move_table(booking_id, table1_id)
        .await
        .unwrap();

    store.with(|data| {
        assert_eq!(data.assignments.len(), 1);
        assert_eq!(data.assignments[0].table_id, table1_id);
    });
}

#[tokio::test]
async fn occupied_target_is_rejected_before_the_write() {
    let store = FakeStore::new();
    let floor = area();
    let table3 = table_in("3", 4, floor);
    let table5 = table_in("5", 6, floor);
    let (table3_id, table5_id) = (table3.table_id, table5.table_id);

    let booking = booking_at(d(2025, 7, 4), (19, 0), 4, BookingStatus::Confirmed);
    let holder = booking_at(d(2025, 7, 4), (19, 0), 2, BookingStatus::Confirmed);
    let (booking_id, holder_id) = (booking.booking_id, holder.booking_id);

    store.with(|data| {
        data.tables.push(table3);
        data.tables.push(table5);
        data.assignments.push(assignment_of(
            booking_id,
            table3_id,
            window(d(2025, 7, 4), (19, 0), (21, 0)),
        ));
        data.assignments.push(assignment_of(
            holder_id,
            table5_id,
            window(d(2025, 7, 4), (19, 0), (21, 0)),
        ));
        data.bookings.push(booking);
        data.bookings.push(holder);
    });

    let err = resolver(&store)
        .move_table(booking_id, table5_id)
        .await
        .unwrap_err();
    assert!(matches!(err, MoveTableError::TableNoLongerAvailable));
}

#[tokio::test]
async fn cancelled_and_no_show_bookings_cannot_move() {
    let store = FakeStore::new();
    let floor = area();
    let table5 = table_in("5", 6, floor);
    let table5_id = table5.table_id;

    let cancelled = booking_at(d(2025, 7, 4), (19, 0), 2, BookingStatus::Cancelled);
    let no_show = booking_at(d(2025, 7, 4), (19, 0), 2, BookingStatus::NoShow);
    let (cancelled_id, no_show_id) = (cancelled.booking_id, no_show.booking_id);

    store.with(|data| {
        data.tables.push(table5);
        data.bookings.push(cancelled);
        data.bookings.push(no_show);
    });

    let svc = resolver(&store);
    for booking_id in [cancelled_id, no_show_id] {
        let err = svc.move_table(booking_id, table5_id).await.unwrap_err();
        assert!(matches!(err, MoveTableError::BookingNotMovable { .. }));
    }
}

#[tokio::test]
async fn moving_an_unknown_booking_is_not_found() {
    let store = FakeStore::new();
    let err = resolver(&store)
        .move_table(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, MoveTableError::BookingNotFound(_)));
}
