//! A broker ledger reconstructs into FIFO round trips plus cash events.
//!
//! GREEN when:
//! - a buy closed by a later sell yields one long round trip with
//!   `(exit - entry) * qty` realized;
//! - a short closed by a cover yields one short round trip with
//!   `(entry - exit) * qty` realized;
//! - a sell spanning several buy lots consumes them oldest first and leaves
//!   the unmatched remainder open;
//! - deposit, withdraw, fee and interest rows never reach lot matching;
//! - rows with an unrecognised action are counted as ignored.

use tg_ingest::{fifo_round_trips, load_ledger, CashKind, Direction, RoundTrip};
use tg_schemas::{Micros, Side};

fn m(s: &str) -> Micros {
    Micros::parse(s).unwrap()
}

fn round_trips(src: &str) -> Vec<RoundTrip> {
    let ledger = load_ledger(src.as_bytes()).unwrap();
    assert!(ledger.rejected.is_empty(), "rejected: {:?}", ledger.rejected);
    fifo_round_trips(&ledger.executions)
}

// ---------------------------------------------------------------------------

#[test]
fn long_position_closed_by_sell() {
    let trips = round_trips(
        "date,ticker,action,quantity,price,amount\n\
         2024-03-01,AAPL,Buy,10,150.00,-1500\n\
         2024-03-04,AAPL,Sell,10,155.50,1555\n",
    );
    assert_eq!(trips.len(), 1);
    let t = &trips[0];
    assert_eq!(t.direction, Direction::Long);
    assert_eq!(t.qty, m("10"));
    assert_eq!(t.entry_price, m("150"));
    assert_eq!(t.exit_price, m("155.5"));
    assert_eq!(t.realized_pnl, Some(m("55")));
    assert_eq!(t.opened_at.date_naive().to_string(), "2024-03-01");
    assert_eq!(t.closed_at.date_naive().to_string(), "2024-03-04");
    assert_eq!(t.closing_line, 3);

    let trade = t.to_new_trade("u1");
    assert_eq!(trade.side, Side::Buy);
    assert_eq!(trade.pnl, Some(m("55")));
}

#[test]
fn short_position_closed_by_cover() {
    let trips = round_trips(
        "date,ticker,action,quantity,price\n\
         2024-03-01,TSLA,Sell Short,5,200\n\
         2024-03-02,TSLA,Buy to Cover,5,210.25\n",
    );
    assert_eq!(trips.len(), 1);
    let t = &trips[0];
    assert_eq!(t.direction, Direction::Short);
    assert_eq!(t.entry_price, m("200"));
    assert_eq!(t.exit_price, m("210.25"));
    assert_eq!(t.realized_pnl, Some(m("-51.25")));
    assert_eq!(t.to_new_trade("u1").side, Side::Short);
}

#[test]
fn sell_consumes_lots_oldest_first() {
    let trips = round_trips(
        "date,ticker,action,quantity,price\n\
         2024-03-01,NVDA,Buy,3,100\n\
         2024-03-02,NVDA,Buy,4,110\n\
         2024-03-03,NVDA,Buy,5,120\n\
         2024-03-05,NVDA,Sell,8,130\n",
    );
    let slices: Vec<_> = trips
        .iter()
        .map(|t| (t.qty, t.entry_price, t.realized_pnl))
        .collect();
    assert_eq!(
        slices,
        vec![
            (m("3"), m("100"), Some(m("90"))),
            (m("4"), m("110"), Some(m("80"))),
            (m("1"), m("120"), Some(m("10"))),
        ]
    );
    // 4 shares of the third lot stay open and produce nothing.
    let total: Micros = trips.iter().fold(Micros::ZERO, |acc, t| acc.saturating_add(t.qty));
    assert_eq!(total, m("8"));
}

#[test]
fn partial_sells_split_one_lot() {
    let trips = round_trips(
        "date,ticker,action,quantity,price\n\
         2024-03-01,AMD,Buy,10,50\n\
         2024-03-02,AMD,Sell,4,55\n\
         2024-03-03,AMD,Sell,6,45\n",
    );
    assert_eq!(trips.len(), 2);
    assert_eq!((trips[0].qty, trips[0].realized_pnl), (m("4"), Some(m("20"))));
    assert_eq!((trips[1].qty, trips[1].realized_pnl), (m("6"), Some(m("-30"))));
    assert!(trips.iter().all(|t| t.opened_at == trips[0].opened_at));
}

#[test]
fn cash_rows_are_separated_from_executions() {
    let src = "Date,Symbol,Description,Qty,Price,Amount\n\
               2024-03-01,,ACH Deposit,,,5000\n\
               2024-03-01,SPY,Buy,2,500,-1000\n\
               2024-03-01,SPY,Commission,,,-1.00\n\
               2024-03-15,,Credit Interest,,,0.42\n\
               2024-03-20,,Withdrawal,,,-250\n\
               2024-03-21,SPY,Dividend,,,3.10\n\
               2024-03-22,SPY,Sell,2,510,1020\n";
    let ledger = load_ledger(src.as_bytes()).unwrap();

    assert!(ledger.rejected.is_empty());
    assert_eq!(ledger.executions.len(), 2);
    assert_eq!(ledger.ignored, 1);

    let kinds: Vec<_> = ledger
        .cash_events
        .iter()
        .map(|e| (e.kind, e.amount))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (CashKind::Deposit, Some(m("5000"))),
            (CashKind::Fee, Some(m("-1"))),
            (CashKind::Interest, Some(m("0.42"))),
            (CashKind::Withdraw, Some(m("-250"))),
        ]
    );
    assert_eq!(ledger.cash_events[1].note, "Commission");

    // The commission row does not alter the round trip; fees stay 0.
    let trips = fifo_round_trips(&ledger.executions);
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].realized_pnl, Some(m("20")));
    assert_eq!(trips[0].to_new_trade("u1").fees, Micros::ZERO);
}

#[test]
fn executions_are_matched_in_time_order_not_file_order() {
    let trips = round_trips(
        "date,ticker,action,quantity,price\n\
         2024-03-05,META,Sell,1,300\n\
         2024-03-01,META,Buy,1,280\n",
    );
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].direction, Direction::Long);
    assert_eq!(trips[0].realized_pnl, Some(m("20")));
}

#[test]
fn round_trips_are_ordered_by_close_then_symbol() {
    let trips = round_trips(
        "date,ticker,action,quantity,price\n\
         2024-03-01,MSFT,Buy,1,400\n\
         2024-03-01,AAPL,Buy,1,150\n\
         2024-03-03,MSFT,Sell,1,410\n\
         2024-03-03,AAPL,Sell,1,155\n\
         2024-03-02,GOOG,Short,1,140\n\
         2024-03-02,GOOG,Cover,1,139\n",
    );
    let order: Vec<_> = trips.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(order, vec!["GOOG", "AAPL", "MSFT"]);
}
