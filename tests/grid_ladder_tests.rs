// Grid ladder behaviour against the paper exchange

mod common;

use common::fast_config;
use spot_trading_bot::core::{GridLadder, OrderExecutionController};
use spot_trading_bot::{BotError, Exchange, GridBot, JsonStateStore, PaperExchange};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn exec_for(paper: &Arc<PaperExchange>) -> OrderExecutionController<PaperExchange> {
    let dir = tempdir().unwrap();
    OrderExecutionController::new(paper.clone(), &fast_config(dir.path()).bot)
}

/// Close above every level: an all-buy ladder with the hole at the top and
/// no seed inventory needed.
fn all_buy_ladder(paper: &Arc<PaperExchange>) -> GridLadder {
    let dir = tempdir().unwrap();
    let config = fast_config(dir.path());
    paper.push_price(9.0);
    GridLadder::new("XBTUSD", &config.grid, 9.0).unwrap()
}

#[tokio::test]
async fn arming_rests_one_order_per_active_level() {
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    let exec = exec_for(&paper);
    let mut ladder = all_buy_ladder(&paper);

    let mut journal = Vec::new();
    ladder
        .place_initial_orders(&exec, 9.0, &mut journal)
        .await
        .unwrap();

    // levels 0..=2 are active buys, level 3 is the hole
    assert_eq!(paper.open_order_count(), 3);
    assert_eq!(journal.len(), 3);
    assert_eq!(ladder.outstanding_txids().len(), 3);
}

#[tokio::test]
async fn seed_buy_blocks_until_filled() {
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    let exec = exec_for(&paper);
    paper.push_price(6.5);
    let dir = tempdir().unwrap();
    let config = fast_config(dir.path());
    let mut ladder = GridLadder::new("XBTUSD", &config.grid, 6.5).unwrap();
    assert_eq!(ladder.seed_quantity(), 2.0);

    // fill the seed buy from the side once it appears on the book
    let filler = paper.clone();
    tokio::spawn(async move {
        for _ in 0..500 {
            if let Some(txid) = filler.open_txids().first() {
                filler.fill(txid);
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let mut journal = Vec::new();
    ladder
        .place_initial_orders(&exec, 6.5, &mut journal)
        .await
        .unwrap();

    // seed txid plus the three level orders
    assert_eq!(journal.len(), 4);
    assert_eq!(paper.open_order_count(), 3);
    // the seed buy is maker-only like every other grid order
    assert!(paper.order(&journal[0]).unwrap().request.post_only);
}

#[tokio::test]
async fn validate_only_receipts_are_not_polled() {
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    paper.set_validate_only(true);
    let exec = exec_for(&paper);
    paper.push_price(6.5);
    let dir = tempdir().unwrap();
    let config = fast_config(dir.path());
    let mut ladder = GridLadder::new("XBTUSD", &config.grid, 6.5).unwrap();

    // every submission is acknowledged without a txid; nothing rests, so
    // the ladder arms without blocking on the seed buy
    let mut journal = Vec::new();
    ladder
        .place_initial_orders(&exec, 6.5, &mut journal)
        .await
        .unwrap();
    assert!(journal.is_empty());
    assert_eq!(paper.open_order_count(), 0);

    // with no txids on the book there is nothing to query, and no empty
    // ids may leak into a QueryOrders payload
    assert!(ladder.outstanding_txids().is_empty());
    let fills = ladder.update_orders(&exec, &mut journal).await.unwrap();
    assert_eq!(fills, 0);
}

#[tokio::test]
async fn a_fill_walks_the_hole_and_rearms_the_neighbour() {
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    let exec = exec_for(&paper);
    let mut ladder = all_buy_ladder(&paper);
    let mut journal = Vec::new();
    ladder
        .place_initial_orders(&exec, 9.0, &mut journal)
        .await
        .unwrap();

    // fill the buy at level 2 (limit 7.0), adjacent to the hole at 3
    let txid = ladder
        .outstanding_txids()
        .into_iter()
        .find(|(index, _)| *index == 2)
        .map(|(_, txid)| txid)
        .unwrap();
    paper.fill(&txid);

    let fills = ladder.update_orders(&exec, &mut journal).await.unwrap();
    assert_eq!(fills, 1);
    assert_eq!(ladder.inactive_index(), 2);
    assert_eq!(
        ladder.levels()[3].side,
        spot_trading_bot::OrderSide::Sell
    );
    assert_eq!(journal.len(), 4);
    assert_eq!(ladder.filled_orders().len(), 1);

    // now fill that sell at 8.0: the round trip books the 1.0 spread
    let (_, sell_txid) = ladder
        .outstanding_txids()
        .into_iter()
        .find(|(index, _)| *index == 3)
        .unwrap();
    paper.fill(&sell_txid);
    let fills = ladder.update_orders(&exec, &mut journal).await.unwrap();
    assert_eq!(fills, 1);
    assert_eq!(ladder.inactive_index(), 3);
    assert!((ladder.realized_gain() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn simultaneous_buy_fills_process_top_down() {
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    let exec = exec_for(&paper);
    let mut ladder = all_buy_ladder(&paper);
    let mut journal = Vec::new();
    ladder
        .place_initial_orders(&exec, 9.0, &mut journal)
        .await
        .unwrap();

    // one crash candle fills all three resting buys at once
    paper.push_price(4.8);
    let fills = ladder.update_orders(&exec, &mut journal).await.unwrap();
    assert_eq!(fills, 3);
    assert_eq!(ladder.inactive_index(), 0);
    for level in &ladder.levels()[1..] {
        assert_eq!(level.side, spot_trading_bot::OrderSide::Sell);
    }
    ladder.check_invariants().unwrap();
}

#[tokio::test]
async fn canceled_level_order_is_fatal() {
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    let exec = exec_for(&paper);
    let mut ladder = all_buy_ladder(&paper);
    let mut journal = Vec::new();
    ladder
        .place_initial_orders(&exec, 9.0, &mut journal)
        .await
        .unwrap();

    let (_, txid) = ladder.outstanding_txids().into_iter().next().unwrap();
    paper.cancel_order(&txid).await.unwrap();

    let err = ladder.update_orders(&exec, &mut journal).await.unwrap_err();
    assert!(matches!(err, BotError::OrderRejected(_)));
}

#[tokio::test]
async fn grid_bot_cancels_resting_orders_on_stop() {
    let dir = tempdir().unwrap();
    let config = fast_config(dir.path());
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    paper.push_price(9.0);

    let store = JsonStateStore::new(dir.path());
    let bot = GridBot::new(paper.clone(), &config, store.clone());
    let control = bot.control();
    let task = tokio::spawn(bot.run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(paper.open_order_count(), 3);

    control.stop();
    task.await.unwrap().unwrap();
    assert_eq!(paper.open_order_count(), 0);

    let state = store.load("test-bot").unwrap();
    assert!(!state.is_running);
    assert_eq!(state.open_order_txids.len(), 3);
}

#[tokio::test]
async fn grid_bot_dismantles_below_stop_loss() {
    let dir = tempdir().unwrap();
    let config = fast_config(dir.path());
    let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
    paper.push_price(9.0);

    let store = JsonStateStore::new(dir.path());
    let bot = GridBot::new(paper.clone(), &config, store.clone());
    let task = tokio::spawn(bot.run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    // crash through every buy level and the stop-loss price in one move
    paper.push_price(4.0);

    // the bot notices the stop-loss on its own and exits cleanly
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(paper.open_order_count(), 0);
    assert!(!store.load("test-bot").unwrap().is_running);
}
