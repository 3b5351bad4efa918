//! End-to-end lifecycle tests against the in-memory backends.

use dispatch_config::Config;
use dispatch_core::{DispatchBuilder, DispatchError, Dispatcher};
use dispatch_store::{all_directory_implementations, all_order_store_implementations};
use dispatch_types::{current_timestamp, Order, OrderStatus, StoreResponseStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const CONFIG: &str = r#"
[service]
id = "dispatch-test"
sweep_interval_seconds = 1
request_timeout_ms = 2000

[order_store]
backend = "memory"

[directory]
backend = "memory"
[directory.config]
stores = [
	{ id = "s1", name = "Acme" },
	{ id = "s2", name = "Globex" },
	{ id = "s3", name = "Initech", active = false },
]
"#;

fn dispatcher() -> Dispatcher {
	let config: Config = CONFIG.parse().unwrap();
	let mut builder = DispatchBuilder::new(config);
	for (name, factory) in all_order_store_implementations() {
		builder = builder.with_order_store_factory(name, factory);
	}
	for (name, factory) in all_directory_implementations() {
		builder = builder.with_directory_factory(name, factory);
	}
	builder.build().unwrap()
}

fn pending_order(id: &str, preferred: Option<&str>) -> Order {
	Order {
		id: id.to_string(),
		order_code: Some(format!("ORD-{}", id)),
		status: OrderStatus::Pending,
		preferred_store_name: preferred.map(str::to_string),
		assigned_store_id: None,
		response_status: None,
		response_at: None,
		rejection_reason: None,
		return_reason: None,
		declined_by: None,
		payload: serde_json::json!({ "customer": "c-1", "items": 2 }),
		created_at: current_timestamp(),
		updated_at: current_timestamp(),
	}
}

#[tokio::test]
async fn full_lifecycle_to_delivery() {
	let dispatcher = dispatcher();
	dispatcher
		.insert_order(pending_order("o1", None))
		.await
		.unwrap();

	let assigned = dispatcher.assign_manual("o1", "s1").await.unwrap();
	assert_eq!(assigned.status, OrderStatus::Assigned);
	assert_eq!(assigned.assigned_store_id.as_deref(), Some("s1"));

	let outcome = dispatcher
		.respond("o1", "s1", StoreResponseStatus::Available, None)
		.await
		.unwrap();
	assert!(!outcome.already_recorded);

	let delivered = dispatcher.mark_delivered("o1", "s1").await.unwrap();
	assert_eq!(delivered.status, OrderStatus::Delivered);
	assert_eq!(delivered.assigned_store_id.as_deref(), Some("s1"));
	assert!(delivered.assignment_consistent());

	// Terminal rows accept no further transitions.
	let result = dispatcher.assign_manual("o1", "s2").await;
	assert!(matches!(result, Err(DispatchError::NotEligible { .. })));
	let result = dispatcher
		.respond("o1", "s1", StoreResponseStatus::Unavailable, Some("late"))
		.await;
	assert!(matches!(result, Err(DispatchError::AlreadyTerminal)));
}

#[tokio::test]
async fn decline_requeues_and_the_sweep_reassigns() {
	let dispatcher = dispatcher();
	dispatcher
		.insert_order(pending_order("o1", Some("globex")))
		.await
		.unwrap();

	dispatcher.assign_manual("o1", "s1").await.unwrap();
	dispatcher
		.respond("o1", "s1", StoreResponseStatus::Unavailable, Some("no stock"))
		.await
		.unwrap();

	let requeued = dispatcher.get_order("o1").await.unwrap();
	assert_eq!(requeued.status, OrderStatus::Pending);
	assert!(requeued.assigned_store_id.is_none());
	assert_eq!(requeued.declined_by.as_deref(), Some("s1"));

	let summary = dispatcher.auto_assign_batch(None).await.unwrap();
	assert_eq!(summary.assigned, 1);

	let reassigned = dispatcher.get_order("o1").await.unwrap();
	assert_eq!(reassigned.status, OrderStatus::Assigned);
	assert_eq!(reassigned.assigned_store_id.as_deref(), Some("s2"));
	// The new assignment starts with a clean response slate.
	assert!(reassigned.response_status.is_none());
	assert_eq!(reassigned.declined_by.as_deref(), Some("s1"));
}

#[tokio::test]
async fn returned_orders_carry_the_reason() {
	let dispatcher = dispatcher();
	dispatcher
		.insert_order(pending_order("o1", None))
		.await
		.unwrap();

	dispatcher.assign_manual("o1", "s2").await.unwrap();
	dispatcher
		.respond("o1", "s2", StoreResponseStatus::Available, None)
		.await
		.unwrap();
	let returned = dispatcher
		.mark_returned("o1", "s2", "customer refused delivery")
		.await
		.unwrap();

	assert_eq!(returned.status, OrderStatus::Returned);
	assert_eq!(
		returned.return_reason.as_deref(),
		Some("customer refused delivery")
	);
}

#[tokio::test]
async fn delivery_requires_a_recorded_acceptance() {
	let dispatcher = dispatcher();
	dispatcher
		.insert_order(pending_order("o1", None))
		.await
		.unwrap();
	dispatcher.assign_manual("o1", "s1").await.unwrap();

	let result = dispatcher.mark_delivered("o1", "s1").await;
	assert!(matches!(result, Err(DispatchError::PreconditionFailed(_))));
}

#[tokio::test]
async fn sweep_skips_inactive_and_unknown_stores() {
	let dispatcher = dispatcher();
	dispatcher
		.insert_order(pending_order("o1", Some("Initech")))
		.await
		.unwrap();
	dispatcher
		.insert_order(pending_order("o2", Some("Umbrella")))
		.await
		.unwrap();

	let summary = dispatcher.auto_assign_batch(None).await.unwrap();
	assert_eq!(summary.assigned, 0);
	assert_eq!(summary.unmatched, 2);

	for id in ["o1", "o2"] {
		let order = dispatcher.get_order(id).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
	}
}

#[tokio::test]
async fn run_loop_sweeps_and_the_relay_notifies() {
	let dispatcher = Arc::new(dispatcher());
	let mut admin = dispatcher.subscribe_admin();
	let mut store_feed = dispatcher.subscribe_store("s1").await;

	let runner = {
		let dispatcher = dispatcher.clone();
		tokio::spawn(async move { dispatcher.run().await })
	};
	// Give the relay a moment to attach to the change feed.
	tokio::time::sleep(Duration::from_millis(200)).await;

	dispatcher
		.insert_order(pending_order("o1", Some("acme")))
		.await
		.unwrap();

	let assigned = timeout(Duration::from_secs(10), async {
		loop {
			let order = admin.recv().await.unwrap();
			if order.status == OrderStatus::Assigned {
				return order;
			}
		}
	})
	.await
	.expect("sweep did not assign within the deadline");
	assert_eq!(assigned.assigned_store_id.as_deref(), Some("s1"));

	let seen = timeout(Duration::from_secs(10), async {
		loop {
			let order = store_feed.recv().await.unwrap();
			if order.assigned_store_id.as_deref() == Some("s1") {
				return order;
			}
		}
	})
	.await
	.expect("store feed did not deliver the assignment");
	assert_eq!(seen.id, "o1");

	runner.abort();
}
