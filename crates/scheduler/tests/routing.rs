//! Integration test: inbound event routing and cancellation
//!
//! Events are delivered with `Scheduler::route`, the same entry point the
//! session callback thread uses.

mod common;

use chrono::Utc;
use common::{Harness, order_status, quotes};
use matrix_core::requests::{
    CommissionReport, ContractDetails, Execution, PositionEntry, Tick,
};
use matrix_core::{
    CancelReason, Contract, InstrumentKey, OptionRight, Order, Payload, RequestHooks, RequestId,
    RequestKind, RequestState, Side, SingletonSlot,
};
use matrix_ports::SessionEvent;
use matrix_scheduler::{Error, OrderBucket, SchedulerConfig};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn error(request_id: Option<RequestId>, code: i32, message: &str) -> SessionEvent {
    SessionEvent::Error {
        request_id,
        code,
        message: message.to_string(),
    }
}

fn fill(exec_id: &str, order_id: RequestId) -> Execution {
    Execution {
        exec_id: exec_id.to_string(),
        order_id,
        time: Utc::now(),
        shares: dec!(10),
        price: dec!(100),
        side: "BOT".to_string(),
    }
}

fn commission(exec_id: &str) -> CommissionReport {
    CommissionReport {
        exec_id: exec_id.to_string(),
        commission: dec!(1.25),
        currency: "USD".to_string(),
        realized_pnl: None,
    }
}

#[test]
fn test_reply_kind_completes_on_first_payload() {
    let h = Harness::new(SchedulerConfig::default());
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = completed.clone();
    let hooks = RequestHooks::new().on_complete(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let details = h
        .scheduler
        .request_contract_details(Contract::stock("AAPL"), hooks)
        .unwrap();
    let payload = Payload::ContractDetails(ContractDetails {
        contract: Contract::stock("AAPL").with_con_id(265598),
        min_tick: dec!(0.01),
        long_name: "APPLE INC".to_string(),
    });
    h.scheduler.route(
        h.client,
        SessionEvent::Data {
            request_id: details.id(),
            payload: payload.clone(),
        },
    );

    assert!(details.is_finished());
    assert_eq!(details.data(), vec![payload]);
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    // A late end marker changes nothing
    h.scheduler
        .route(h.client, SessionEvent::End { request_id: details.id() });
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(h.scheduler.last_activity(h.client).unwrap().is_some());
}

#[test]
fn test_stream_ticks_split_by_type() {
    let h = Harness::new(SchedulerConfig::default().without_ceiling(RequestKind::MarketData));
    let stream = h
        .scheduler
        .request_market_data(quotes("AAPL"), RequestHooks::new())
        .unwrap();
    assert!(stream.is_active());

    let tick = |field: &str, value| Tick {
        time: Utc::now(),
        field: field.to_string(),
        value,
    };
    for payload in [
        Payload::PriceTick(tick("BID", dec!(100.1))),
        Payload::SizeTick(tick("BID_SIZE", dec!(300))),
        Payload::PriceTick(tick("ASK", dec!(100.2))),
    ] {
        h.scheduler.route(
            h.client,
            SessionEvent::Data {
                request_id: stream.id(),
                payload,
            },
        );
    }

    assert_eq!(stream.prices().len(), 2);
    assert_eq!(stream.sizes().len(), 1);
    let current = h
        .scheduler
        .market_data_for(&InstrumentKey::from("AAPL"))
        .unwrap();
    assert_eq!(current.key(), stream.key());
}

#[test]
fn test_warnings_and_session_faults() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;
    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    let hooks = RequestHooks::new().on_error(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let details = s
        .request_contract_details(Contract::stock("AAPL"), hooks)
        .unwrap();

    // Farm status chatter: ignored even when it names the request
    s.route(h.client, error(Some(details.id()), 2104, "Market data farm connection is OK"));
    assert!(details.is_active());
    assert!(details.errors().is_empty());

    // Connectivity lost: flags the session, leaves the request alone
    s.route(h.client, error(None, 1100, "Connectivity between IB and TWS has been lost"));
    assert!(details.is_active());
    assert_eq!(s.sessions_needing_reconnect(), vec![h.client]);
    s.clear_reconnect(h.client).unwrap();
    assert!(s.sessions_needing_reconnect().is_empty());

    // Request error: logged, finalized, hook called once
    s.route(h.client, error(Some(details.id()), 200, "No security definition"));
    assert!(details.is_errored());
    assert_eq!(details.errors().len(), 1);
    assert_eq!(details.errors()[0].code, 200);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // Errors for unknown ids are dropped
    s.route(h.client, error(Some(RequestId(999)), 200, "unknown"));
    s.route(h.client, error(None, 321, "no id"));
}

#[test]
fn test_singleton_slot_reuse() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let first = s.request_positions(RequestHooks::new()).unwrap();
    let again = s.request_positions(RequestHooks::new()).unwrap();
    assert_eq!(first.key(), again.key());
    assert_eq!(h.session.sent_ids(RequestKind::Positions), vec![first.id()]);

    let position = Payload::Position(PositionEntry {
        account: "DU123".to_string(),
        contract: Contract::stock("AAPL"),
        position: dec!(100),
        avg_cost: dec!(150),
        model_code: None,
    });
    s.route(
        h.client,
        SessionEvent::Snapshot {
            slot: SingletonSlot::Positions,
            payload: position.clone(),
        },
    );
    assert!(first.is_active());
    s.route(h.client, SessionEvent::SnapshotEnd { slot: SingletonSlot::Positions });
    assert!(first.is_finished());
    assert_eq!(first.data(), vec![position]);

    // Terminal slot: a new request goes out
    let next = s.request_positions(RequestHooks::new()).unwrap();
    assert_ne!(next.key(), first.key());
    assert_eq!(h.session.sent_ids(RequestKind::Positions).len(), 2);
}

#[test]
fn test_managed_accounts_on_chosen_session() {
    let h = Harness::new(SchedulerConfig::default());
    let accounts = h
        .scheduler
        .request_managed_accounts(Some(h.client), RequestHooks::new())
        .unwrap();
    assert_eq!(accounts.client_id(), h.client);

    h.scheduler.route(
        h.client,
        SessionEvent::Snapshot {
            slot: SingletonSlot::ManagedAccounts,
            payload: Payload::ManagedAccounts(vec!["DU1".into(), "DU2".into()]),
        },
    );
    assert!(accounts.is_finished());

    assert!(matches!(
        h.scheduler
            .request_managed_accounts(Some(matrix_core::ClientId(1)), RequestHooks::new()),
        Err(Error::UnknownSession(_))
    ));
}

#[test]
fn test_order_fill_and_commission_routing() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let orphans = Arc::new(Mutex::new(Vec::new()));
    let sink = orphans.clone();
    s.set_unattributed_commission_hook(move |report| sink.lock().push(report.exec_id.clone()));

    let order = s
        .place_order(
            Contract::stock("AAPL"),
            Order::limit(Side::Buy, dec!(10), dec!(100)),
            RequestHooks::new(),
            Some(RequestId(500)),
        )
        .unwrap();
    assert_eq!(order.id(), RequestId(500));
    assert!(s.has_active_order(&"AAPL".into(), OrderBucket::Buy));

    s.route(
        h.client,
        SessionEvent::Data {
            request_id: order.id(),
            payload: Payload::OrderStatus(order_status("Submitted")),
        },
    );
    assert!(order.is_active());

    s.route(h.client, SessionEvent::Execution(fill("e1", order.id())));
    s.route(
        h.client,
        SessionEvent::Data {
            request_id: order.id(),
            payload: Payload::OrderStatus(order_status("Filled")),
        },
    );
    assert!(order.is_finished());
    assert!(!s.has_active_order(&"AAPL".into(), OrderBucket::Buy));

    // Reports keep landing on the finished order
    s.route(h.client, SessionEvent::Commission(commission("e1")));
    s.route(h.client, SessionEvent::Commission(commission("e-unknown")));

    let trail = order.order_trail().unwrap();
    assert_eq!(trail.statuses.len(), 2);
    assert_eq!(trail.executions.len(), 1);
    assert_eq!(trail.commissions.len(), 1);
    assert_eq!(order.last_order_status().unwrap().status, "Filled");
    assert_eq!(*orphans.lock(), vec!["e-unknown".to_string()]);
}

#[test]
fn test_fill_for_unknown_order_is_not_correlated() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let orphans = Arc::new(Mutex::new(Vec::new()));
    let sink = orphans.clone();
    s.set_unattributed_commission_hook(move |report| sink.lock().push(report.exec_id.clone()));

    // A fill placed from another client lands here with an id we never used
    s.route(h.client, SessionEvent::Execution(fill("e9", RequestId(9_999))));
    let session = s.session(h.client).unwrap();
    assert_eq!(session.order_for_execution("e9"), None);

    s.route(h.client, SessionEvent::Commission(commission("e9")));
    assert_eq!(*orphans.lock(), vec!["e9".to_string()]);
}

#[test]
fn test_invalid_orders_rejected() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let mut bad = Order::limit(Side::Buy, dec!(10), dec!(100));
    bad.limit_price = None;
    assert!(matches!(
        s.place_order(Contract::stock("AAPL"), bad, RequestHooks::new(), None),
        Err(Error::InvalidOrder(_))
    ));

    // Bracket child must be protective
    assert!(matches!(
        s.place_bracket(
            Contract::stock("AAPL"),
            Order::market(Side::Buy, dec!(10)),
            Order::limit(Side::Sell, dec!(10), dec!(120)),
            RequestHooks::new(),
        ),
        Err(Error::InvalidOrder(_))
    ));
    assert_eq!(h.session.send_count(), 0);
}

#[test]
fn test_bracket_cancel_cascades_once() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let (parent, child) = s
        .place_bracket(
            Contract::stock("AAPL"),
            Order::market(Side::Buy, dec!(10)),
            Order::stop(Side::Sell, dec!(10), dec!(95)),
            RequestHooks::new(),
        )
        .unwrap();

    assert_eq!(parent.child(), Some(child.id()));
    assert_eq!(
        h.session.sent_ids(RequestKind::PlaceOrder),
        vec![parent.id(), child.id()]
    );
    let parent_order = parent.params().order().unwrap();
    let child_order = child.params().order().unwrap();
    assert!(!parent_order.transmit);
    assert!(child_order.transmit);
    assert_eq!(child_order.parent_id, Some(parent.id()));
    assert!(s.has_active_order(&"AAPL".into(), OrderBucket::Protective));

    assert!(s.cancel(&parent, CancelReason::Caller("flatten".into())));
    assert!(parent.is_cancelled());
    assert!(child.is_cancelled());
    assert_eq!(
        h.session.cancelled_ids(RequestKind::PlaceOrder),
        vec![parent.id(), child.id()]
    );

    // Second cancel is a no-op everywhere
    assert!(!s.cancel(&parent, CancelReason::Finish));
    assert!(!s.cancel(&child, CancelReason::Finish));
    assert_eq!(h.session.cancel_count(), 2);
    assert!(!s.has_active_order(&"AAPL".into(), OrderBucket::Protective));
}

#[test]
fn test_bracket_parent_error_cascades() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let (parent, child) = s
        .place_bracket(
            Contract::stock("MSFT"),
            Order::limit(Side::Buy, dec!(5), dec!(400)),
            Order::trailing(Side::Sell, dec!(5), matrix_core::Trail::Percent(dec!(2))),
            RequestHooks::new(),
        )
        .unwrap();

    s.route(h.client, error(Some(parent.id()), 201, "Order rejected"));
    assert!(parent.is_errored());
    assert_eq!(parent.errors().len(), 1);

    // The child is cancelled, not errored: the venue never rejected it
    assert_eq!(child.state(), RequestState::Cancelled);
    assert_eq!(child.reason(), Some(CancelReason::ParentFailed));
    assert!(child.errors().is_empty());
    assert_eq!(
        h.session.cancelled_ids(RequestKind::PlaceOrder),
        vec![child.id()]
    );

    // The venue echoing an error for the child changes nothing
    s.route(h.client, error(Some(child.id()), 202, "Order Canceled"));
    assert_eq!(h.session.cancel_count(), 1);
}

#[test]
fn test_bulk_cancellation() {
    let h = Harness::new(SchedulerConfig::default().without_ceiling(RequestKind::MarketData));
    let s = &h.scheduler;

    let stream = s.request_market_data(quotes("AAPL"), RequestHooks::new()).unwrap();
    let summary = s
        .request_account_summary("All", vec!["NetLiquidation".into()], RequestHooks::new())
        .unwrap();
    let buy = s
        .place_order(
            Contract::stock("AAPL"),
            Order::limit(Side::Buy, dec!(1), dec!(99)),
            RequestHooks::new(),
            None,
        )
        .unwrap();
    let sell = s
        .place_order(
            Contract::stock("AAPL"),
            Order::limit(Side::Sell, dec!(1), dec!(101)),
            RequestHooks::new(),
            None,
        )
        .unwrap();
    assert_eq!(s.active_requests().len(), 4);

    assert_eq!(s.cancel_all_requests(), 2);
    assert_eq!(stream.reason(), Some(CancelReason::Finish));
    assert!(summary.is_cancelled());
    assert!(buy.is_active());

    assert_eq!(
        s.cancel_orders_for(&"AAPL".into(), OrderBucket::Sell, CancelReason::Unselected),
        1
    );
    assert!(sell.is_cancelled());
    assert!(buy.is_active());

    assert_eq!(s.cancel_all_orders(), 1);
    assert!(buy.is_cancelled());
    assert!(s.active_requests().is_empty());

    assert_eq!(s.prune_terminal(), 4);
    assert!(s.request(buy.key()).is_none());
    assert!(s.market_data_for(&"AAPL".into()).is_none());
    assert!(s.orders_for(&"AAPL".into(), OrderBucket::Buy).is_empty());
}

#[test]
fn test_reconcile_market_data() {
    let h = Harness::new(SchedulerConfig::default());
    let s = &h.scheduler;

    let call = Contract::option("AAPL", dec!(150), "20261218", 100, OptionRight::Call);
    for contract in [Contract::stock("AAPL"), Contract::stock("MSFT"), call.clone()] {
        s.request_market_data(
            matrix_core::requests::MarketDataParams::streaming(contract),
            RequestHooks::new(),
        )
        .unwrap();
    }
    s.sweep_once();
    assert_eq!(s.in_flight(RequestKind::MarketData), 3);

    let wanted = [Contract::stock("AAPL"), Contract::stock("TSLA")];
    let report = s.reconcile_market_data(&wanted, RequestHooks::new()).unwrap();
    assert_eq!(report.kept, 1);
    assert_eq!(report.cancelled, 1);
    // Plenty of room: the option stream is not worth cancelling
    assert_eq!(report.deferred, 1);
    assert_eq!(report.requested.len(), 1);

    let msft = s.market_data_for(&"MSFT".into()).unwrap();
    assert_eq!(msft.reason(), Some(CancelReason::Unselected));
    assert!(s.market_data_for(&call.instrument_key()).unwrap().is_active());

    // TSLA is still queued, so it is not requested twice
    assert!(s.is_queued_for(RequestKind::MarketData, &"TSLA".into()));
    let again = s.reconcile_market_data(&wanted, RequestHooks::new()).unwrap();
    assert!(again.requested.is_empty());
    assert_eq!(s.queued(RequestKind::MarketData), 1);
}
