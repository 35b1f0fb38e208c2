mod common;

use std::time::Duration;

use battlemap_server::game::grid::{GridPos, WorldPos};
use battlemap_server::game::tokens::{Token, TokenKind};
use battlemap_server::{EngineError, Outcome};
use common::*;

fn hero(x: i32, y: i32) -> Token {
    Token::new("hero", "Aria", TokenKind::PlayerCharacter, GridPos::new(x, y)).owned_by("p1")
}

#[tokio::test(start_paused = true)]
async fn drag_writes_only_after_the_pointer_rests() {
    let mut t = table().await;
    t.p1.place_token(hero(0, 0)).await.unwrap();
    assert_eq!(t.p1.begin_drag("hero").await, Ok(Outcome::Applied));

    for x in 1..=10 {
        assert_eq!(t.p1.drag_to(px(x, 0)).await, Ok(GridPos::new(x, 0)));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(t.store.revision(SESSION), Some(1));
    assert_eq!(position_of(&t.p1, "hero").await, Some(GridPos::new(10, 0)));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(t.store.revision(SESSION), Some(2));
    t.p2.sync().await.unwrap();
    assert_eq!(position_of(&t.p2, "hero").await, Some(GridPos::new(10, 0)));

    assert_eq!(t.p1.end_drag(px(10, 0)).await, Ok(Outcome::Applied));
    assert_eq!(t.store.revision(SESSION), Some(3));
    assert_eq!(t.p1.dragging(), None);
}

#[tokio::test(start_paused = true)]
async fn local_drag_position_survives_incoming_broadcasts() {
    let mut t = table().await;
    t.p1.place_token(hero(2, 2)).await.unwrap();
    t.gm.sync().await.unwrap();
    t.p1.begin_drag("hero").await.unwrap();
    t.p1.drag_to(px(5, 5)).await.unwrap();

    t.gm.move_token("hero", GridPos::new(9, 9)).await.unwrap();
    t.p1.sync().await.unwrap();
    assert_eq!(position_of(&t.p1, "hero").await, Some(GridPos::new(5, 5)));

    t.p1.end_drag(px(6, 5)).await.unwrap();
    t.sync_all().await;
    assert_eq!(position_of(&t.gm, "hero").await, Some(GridPos::new(6, 5)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_drags_converge_on_the_later_write() {
    let mut t = table().await;
    t.p1.place_token(hero(0, 0)).await.unwrap();
    t.sync_all().await;

    t.gm.begin_drag("hero").await.unwrap();
    t.p1.begin_drag("hero").await.unwrap();
    t.gm.drag_to(px(3, 3)).await.unwrap();
    t.p1.drag_to(px(7, 7)).await.unwrap();
    t.gm.end_drag(px(3, 3)).await.unwrap();
    t.p1.end_drag(px(7, 7)).await.unwrap();
    t.sync_all().await;

    for session in [&t.gm, &t.p1, &t.p2] {
        assert_eq!(position_of(session, "hero").await, Some(GridPos::new(7, 7)));
    }
}

#[tokio::test(start_paused = true)]
async fn release_off_the_map_without_a_write_is_silent() {
    let mut t = table().await;
    t.p1.place_token(hero(4, 4)).await.unwrap();
    t.p1.begin_drag("hero").await.unwrap();
    t.p1.drag_to(px(5, 5)).await.unwrap();

    assert_eq!(
        t.p1.end_drag(WorldPos::new(2000.0, 10.0)).await,
        Ok(Outcome::Cancelled)
    );
    assert_eq!(position_of(&t.p1, "hero").await, Some(GridPos::new(4, 4)));
    assert_eq!(t.store.revision(SESSION), Some(1));

    // The aborted debounce never fires.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(t.store.revision(SESSION), Some(1));
}

#[tokio::test(start_paused = true)]
async fn release_off_the_map_after_a_write_restores_the_origin() {
    let mut t = table().await;
    t.p1.place_token(hero(2, 2)).await.unwrap();
    t.p1.begin_drag("hero").await.unwrap();
    t.p1.drag_to(px(6, 6)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(t.store.revision(SESSION), Some(2));
    t.p1.drag_to(px(8, 8)).await.unwrap();

    assert_eq!(
        t.p1.end_drag(WorldPos::new(-15.0, -15.0)).await,
        Ok(Outcome::Cancelled)
    );
    assert_eq!(t.store.revision(SESSION), Some(3));
    t.sync_all().await;
    assert_eq!(position_of(&t.p1, "hero").await, Some(GridPos::new(2, 2)));
    assert_eq!(position_of(&t.p2, "hero").await, Some(GridPos::new(2, 2)));
}

#[tokio::test(start_paused = true)]
async fn drag_needs_ownership_and_one_at_a_time() {
    let mut t = table().await;
    t.p1.place_token(hero(1, 1)).await.unwrap();
    t.sync_all().await;

    assert_eq!(t.p2.begin_drag("hero").await, Ok(Outcome::Ignored));
    assert!(t.p2.drag_to(px(3, 3)).await.is_err());
    assert_eq!(t.p2.end_drag(px(3, 3)).await, Ok(Outcome::Unchanged));

    t.p1.begin_drag("hero").await.unwrap();
    assert!(matches!(
        t.p1.begin_drag("hero").await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        t.gm.begin_drag("ghost").await,
        Err(EngineError::UnknownToken(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn zoom_changes_pixel_mapping() {
    let mut t = table().await;
    assert_eq!(t.p1.set_zoom(100.0), 60.0);
    assert_eq!(t.p1.set_zoom(10.0), 20.0);
    assert_eq!(t.p1.to_grid(WorldPos::new(45.0, 5.0)), GridPos::new(2, 0));
    assert_eq!(t.p1.set_zoom(40.0), 40.0);
    assert_eq!(t.p1.to_grid(px(3, 4)), GridPos::new(3, 4));
}
