use std::time::Duration;
use webprint::async_api::ViewHandle;
use webprint::capture::{capture, tile_count};
use webprint::session::SessionRegistry;
use webprint::stitch::stitch;
use webprint::view::ScriptedView;
use webprint::{CaptureOutcome, ElementGeometry, Error, StitchError, Tile};

async fn captured_tiles(width: u32, total: u32, step: u32, ratio: f32) -> Vec<Tile> {
    let view = ScriptedView::new(width, total)
        .with_box_height(step)
        .with_pixel_ratio(ratio);
    let handle = ViewHandle::spawn(move || Ok(view)).await.unwrap();
    let geometry = ElementGeometry { x: 0, y: 0, width, height: step, total_height: total };
    let registry = SessionRegistry::new();
    match capture(&handle, geometry, ratio, step, registry.begin(), Duration::ZERO)
        .await
        .unwrap()
    {
        CaptureOutcome::Completed(tiles) => tiles,
        CaptureOutcome::Aborted => panic!("capture aborted"),
    }
}

#[tokio::test]
async fn canvas_has_exactly_content_rows_for_any_split() {
    for (total, step) in [(10u32, 4u32), (12, 4), (13, 4), (1, 7), (99, 10), (100, 33)] {
        let tiles = captured_tiles(8, total, step, 1.0).await;
        assert_eq!(tiles.len(), tile_count(total, step));

        let canvas = stitch(&tiles, 8, total, 1.0).unwrap();
        assert_eq!(canvas.height(), total);
        for y in 0..total {
            assert_eq!(canvas.pixel(0, y), ScriptedView::row_color(y).0, "total {} step {} row {}", total, step, y);
        }
    }
}

#[tokio::test]
async fn fractional_ratio_rounds_canvas_size() {
    let tiles = captured_tiles(101, 250, 100, 1.5).await;
    let canvas = stitch(&tiles, 101, 250, 1.5).unwrap();
    assert_eq!((canvas.width(), canvas.height()), (152, 375));
    assert_eq!(canvas.pixel(0, 374), ScriptedView::row_color(374).0);
}

#[tokio::test]
async fn reversed_tiles_are_rejected() {
    let mut tiles = captured_tiles(8, 30, 10, 1.0).await;
    tiles.reverse();
    let res = stitch(&tiles, 8, 30, 1.0);
    assert!(matches!(
        res,
        Err(Error::Stitch(StitchError::OutOfOrder { expected: 0, found: 2 }))
    ));
}

#[tokio::test]
async fn relabelled_swap_produces_a_different_canvas() {
    let tiles = captured_tiles(8, 30, 10, 1.0).await;
    let in_order = stitch(&tiles, 8, 30, 1.0).unwrap();

    // Swap the content of the first two tiles but keep ordinals consecutive
    let swapped = vec![
        Tile::new(0, tiles[1].data.clone()),
        Tile::new(1, tiles[0].data.clone()),
        tiles[2].clone(),
    ];
    let out_of_order = stitch(&swapped, 8, 30, 1.0).unwrap();

    assert_ne!(in_order.row(0), out_of_order.row(0));
    assert_eq!(out_of_order.pixel(0, 0), ScriptedView::row_color(10).0);
    assert_eq!(in_order.row(25), out_of_order.row(25));
}

#[tokio::test]
async fn every_tile_corrupt_is_fatal() {
    let tiles: Vec<Tile> = (0..3).map(|ordinal| Tile::new(ordinal, vec![0; 16])).collect();
    assert!(matches!(
        stitch(&tiles, 8, 30, 1.0),
        Err(Error::Stitch(StitchError::NoUsableTiles))
    ));
}

#[tokio::test]
async fn clamped_final_scroll_keeps_the_content_tail() {
    // The third scroll asks for 200 but the box can only reach 150
    let tiles = captured_tiles(100, 250, 100, 1.0).await;
    assert_eq!(tiles[2].overlap_rows, 50);

    let canvas = stitch(&tiles, 100, 250, 1.0).unwrap();
    for y in [150, 199, 200, 225, 249] {
        assert_eq!(canvas.pixel(0, y), ScriptedView::row_color(y).0, "row {}", y);
    }
}
