mod common;

use client_lib::client::TodoService;
use client_lib::error::ClientError;
use common::{eventually, Harness};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use todo_core::domain::{TodoFilters, TodoStatus, UserRole};
use todo_core::ports::PortError;
use uuid::Uuid;

fn all() -> TodoFilters {
    TodoFilters::default()
}

#[tokio::test]
async fn toggle_shows_new_status_before_the_write_lands_then_refetches() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Write report", TodoStatus::Pending);
    let service = TodoService::new(h.state.clone());
    service.todos(&all()).await.unwrap();
    assert_eq!(h.db.list_calls.load(Ordering::SeqCst), 1);

    let gate = h.db.gate_next_update();
    let toggling = tokio::spawn({
        let service = service.clone();
        let id = todo.id;
        async move { service.toggle_status(id, TodoStatus::Pending).await }
    });

    eventually(|| h.state.cache.cached_status(todo.id) == Some(TodoStatus::Completed)).await;
    assert_eq!(h.db.stored_todo(todo.id).unwrap().status, TodoStatus::Pending);
    let optimistic = h.state.cache.list(&all()).unwrap();
    assert!(optimistic[0].completed_at.is_some());

    gate.notify_one();
    let updated = toggling.await.unwrap().unwrap();

    assert_eq!(updated.status, TodoStatus::Completed);
    assert!(updated.completed_at.is_some());
    assert_eq!(h.db.list_calls.load(Ordering::SeqCst), 2);
    let listed = h.state.cache.list(&all()).unwrap();
    assert_eq!(listed[0].status, TodoStatus::Completed);
    assert_eq!(listed[0].completed_at, updated.completed_at);
}

#[tokio::test]
async fn failed_toggle_rolls_back_and_still_refetches() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Write report", TodoStatus::Pending);
    let service = TodoService::new(h.state.clone());
    service.todos(&all()).await.unwrap();

    h.db.fail_updates.store(true, Ordering::SeqCst);
    let gate = h.db.gate_next_update();
    let toggling = tokio::spawn({
        let service = service.clone();
        let id = todo.id;
        async move { service.toggle_status(id, TodoStatus::Pending).await }
    });

    eventually(|| h.state.cache.cached_status(todo.id) == Some(TodoStatus::Completed)).await;
    gate.notify_one();
    let err = toggling.await.unwrap().unwrap_err();

    assert!(matches!(err, ClientError::Port(PortError::Unexpected(_))));
    assert_eq!(h.state.cache.cached_status(todo.id), Some(TodoStatus::Pending));
    assert_eq!(h.db.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rollback_leaves_other_todos_alone() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let failing = h.db.add_todo(owner, "First", TodoStatus::Pending);
    let other = h.db.add_todo(owner, "Second", TodoStatus::Pending);
    let service = TodoService::new(h.state.clone());
    service.todos(&all()).await.unwrap();

    // The second toggle settles while the first is still waiting on its write.
    let gate = h.db.gate_next_update();
    let first = tokio::spawn({
        let service = service.clone();
        let id = failing.id;
        async move { service.toggle_status(id, TodoStatus::Pending).await }
    });
    eventually(|| h.state.cache.cached_status(failing.id) == Some(TodoStatus::Completed)).await;

    service.toggle_status(other.id, TodoStatus::Pending).await.unwrap();
    // The second toggle's refetch must not undo the first one's pending value.
    assert_eq!(h.state.cache.cached_status(failing.id), Some(TodoStatus::Completed));
    assert_eq!(h.state.cache.cached_status(other.id), Some(TodoStatus::Completed));

    h.db.fail_updates.store(true, Ordering::SeqCst);
    gate.notify_one();
    first.await.unwrap().unwrap_err();

    assert_eq!(h.state.cache.cached_status(failing.id), Some(TodoStatus::Pending));
    assert_eq!(h.state.cache.cached_status(other.id), Some(TodoStatus::Completed));
}

#[tokio::test]
async fn toggle_of_uncached_todo_commits_directly() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Not loaded yet", TodoStatus::Completed);
    let service = TodoService::new(h.state.clone());

    let updated = service.toggle_status(todo.id, TodoStatus::Completed).await.unwrap();

    assert_eq!(updated.status, TodoStatus::Pending);
    assert!(updated.completed_at.is_none());
    assert_eq!(h.db.stored_todo(todo.id).unwrap().status, TodoStatus::Pending);
}

#[tokio::test]
async fn failed_toggle_of_uncached_todo_reports_error() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Not loaded yet", TodoStatus::Pending);
    h.db.fail_updates.store(true, Ordering::SeqCst);
    let service = TodoService::new(h.state.clone());

    let err = service.toggle_status(todo.id, TodoStatus::Pending).await.unwrap_err();

    assert!(matches!(err, ClientError::Port(_)));
    assert!(h.state.cache.cached_status(todo.id).is_none());
}

#[tokio::test]
async fn in_progress_toggles_to_completed() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Halfway", TodoStatus::InProgress);
    let service = TodoService::new(h.state.clone());
    service.todos(&all()).await.unwrap();

    let updated = service.toggle_status(todo.id, TodoStatus::InProgress).await.unwrap();

    assert_eq!(updated.status, TodoStatus::Completed);
}

#[tokio::test]
async fn rapid_toggles_of_one_todo_apply_in_order() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Flip me", TodoStatus::Pending);
    let service = TodoService::new(h.state.clone());
    service.todos(&all()).await.unwrap();

    // Both callers still see `pending` on screen when they tap.
    let (first, second) = tokio::join!(
        service.toggle_status(todo.id, TodoStatus::Pending),
        service.toggle_status(todo.id, TodoStatus::Pending),
    );

    assert_eq!(first.unwrap().status, TodoStatus::Completed);
    assert_eq!(second.unwrap().status, TodoStatus::Pending);
    assert_eq!(
        *h.db.committed_statuses.lock().unwrap(),
        vec![TodoStatus::Completed, TodoStatus::Pending]
    );
    assert_eq!(h.state.cache.cached_status(todo.id), Some(TodoStatus::Pending));
}

#[tokio::test]
async fn in_flight_fetch_cannot_overwrite_the_optimistic_value() {
    let (h, owner) = Harness::signed_in(UserRole::User).await;
    let todo = h.db.add_todo(owner, "Write report", TodoStatus::Pending);
    let service = TodoService::new(h.state.clone());
    service.todos(&all()).await.unwrap();
    h.state.cache.invalidate_lists();

    // A background refetch that started before the toggle.
    let gate = h.db.gate_next_list();
    let refetch = tokio::spawn({
        let service = service.clone();
        async move { service.todos(&TodoFilters::default()).await }
    });
    eventually(|| h.db.list_calls.load(Ordering::SeqCst) == 2).await;

    service.toggle_status(todo.id, TodoStatus::Pending).await.unwrap();
    gate.notify_one();
    let seen = refetch.await.unwrap().unwrap();

    assert_eq!(seen[0].id, todo.id);
    assert_eq!(h.state.cache.cached_status(todo.id), Some(TodoStatus::Completed));
}

#[tokio::test]
async fn toggle_requires_a_signed_in_user() {
    let h = Harness::new(common::FakeAuth::new(), common::FakeDb::new());
    h.state.session.initialize().await;
    let service = TodoService::new(h.state.clone());

    let err = service.toggle_status(Uuid::new_v4(), TodoStatus::Pending).await.unwrap_err();

    assert!(matches!(err, ClientError::NotAuthenticated));
}
