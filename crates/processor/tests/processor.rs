// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_chain::mock::{MockBridge, MockChain, MockHeaderSyncer};
use bridge_relayer_chain::{StorageProofResponse, StorageSlotProof};
use bridge_relayer_config::ProcessorConfig;
use bridge_relayer_processor::{Delivery, Processor, ProcessorDeps, Timings};
use bridge_relayer_proof::storage_key;
use bridge_relayer_store::{EventRepository, InMemoryStore, Queue};
use bridge_relayer_types::{
    BridgeMessage, EventName, EventStatus, MessageSentEvent, QueueMessageBody,
    SaveEventOpts,
};
use bridge_relayer_utils::metric::{counter, CountingMetrics};
use bridge_relayer_utils::Error;
use ethers::types::{Address, H256, U256};

const SRC: u64 = 167;
const DEST: u64 = 1;
const SRC_BRIDGE: Address = Address::repeat_byte(0xb1);
const DEST_BRIDGE: Address = Address::repeat_byte(0xb2);
const SIGNAL_SERVICE: Address = Address::repeat_byte(0x55);
const EVENT_BLOCK: u64 = 90;

struct Harness {
    src: MockChain,
    src_bridge: MockBridge,
    dest: MockChain,
    dest_bridge: MockBridge,
    syncer: MockHeaderSyncer,
    store: InMemoryStore,
    metrics: Arc<CountingMetrics>,
}

fn proof(value: u64) -> StorageProofResponse {
    StorageProofResponse {
        account_proof: vec![vec![0xa1].into()],
        storage_hash: H256::repeat_byte(0x77),
        storage_proof: vec![StorageSlotProof {
            key: H256::zero(),
            value: value.into(),
            proof: vec![vec![0xb1].into()],
        }],
    }
}

fn timings() -> Timings {
    Timings {
        confirmation_interval: Duration::from_millis(5),
        confirmation_timeout: Duration::from_millis(200),
        header_sync_interval: Duration::from_millis(5),
        header_sync_timeout: Some(Duration::from_millis(200)),
        receipt_interval: Duration::from_millis(5),
        receipt_timeout: Duration::from_millis(500),
        queue_poll_interval: Duration::from_millis(5),
    }
}

fn message(id: u64) -> BridgeMessage {
    BridgeMessage {
        id: id.into(),
        src_chain_id: SRC.into(),
        dest_chain_id: DEST.into(),
        owner: Address::repeat_byte(0x0e),
        gas_limit: 150_000u64.into(),
        processing_fee: 1_000u64.into(),
        ..Default::default()
    }
}

impl Harness {
    fn new() -> Self {
        let src = MockChain::new(SRC, 100);
        src.set_proof(SIGNAL_SERVICE, proof(1));
        let dest = MockChain::new(DEST, 50);
        Self {
            src_bridge: MockBridge::new(SRC_BRIDGE).on_chain(src.clone()),
            dest_bridge: MockBridge::new(DEST_BRIDGE).on_chain(dest.clone()),
            syncer: MockHeaderSyncer::new(src.hash_of(95)),
            src,
            dest,
            store: InMemoryStore::default(),
            metrics: Arc::new(CountingMetrics::default()),
        }
    }

    fn deps(&self) -> ProcessorDeps {
        ProcessorDeps {
            src: Some(Arc::new(self.src.clone())),
            dest: Some(Arc::new(self.dest.clone())),
            dest_bridge: Some(Arc::new(self.dest_bridge.clone())),
            header_syncer: Some(Arc::new(self.syncer.clone())),
            events: Some(Arc::new(self.store.clone())),
            queue: Some(Arc::new(self.store.clone())),
            metrics: Some(self.metrics.clone()),
            src_bridge_address: SRC_BRIDGE,
            signal_service: SIGNAL_SERVICE,
            signer: Address::repeat_byte(0x5e),
            hops: Vec::new(),
            src_chain_id: SRC,
            dest_chain_id: DEST,
        }
    }

    fn processor_with(&self, config: ProcessorConfig) -> Processor {
        Processor::new(self.deps(), config)
            .unwrap()
            .with_timings(timings())
    }

    fn processor(&self) -> Processor {
        self.processor_with(ProcessorConfig::default())
    }

    /// Indexes `message` the way the indexer would and confirms its source
    /// transaction.
    fn indexed(&self, message: BridgeMessage) -> QueueMessageBody {
        let (event, meta) =
            self.src_bridge.push_message_sent(message, EVENT_BLOCK);
        self.src
            .insert_receipt(meta.transaction_hash, EVENT_BLOCK, true);
        let event = MessageSentEvent::new(event, &meta);
        let saved = EventRepository::save(
            &self.store,
            SaveEventOpts {
                name: EventName::MessageSent,
                chain_id: SRC,
                dest_chain_id: DEST,
                data: serde_json::to_string(&event).unwrap(),
                msg_hash: event.msg_hash,
                message_owner: event.message.owner,
                status: EventStatus::New,
                block_id: EVENT_BLOCK,
            },
        )
        .unwrap();
        QueueMessageBody {
            id: saved.id,
            event,
        }
    }

    fn enqueue(&self, processor: &Processor, body: &QueueMessageBody) {
        self.store
            .publish(&processor.queue_name(), serde_json::to_vec(body).unwrap())
            .unwrap();
    }

    fn status_of(&self, id: u64) -> EventStatus {
        self.store
            .events()
            .into_iter()
            .find(|e| e.id == id)
            .unwrap()
            .status
    }
}

async fn deliver(h: &Harness, processor: &Processor) -> Delivery {
    let msg = h.store.next(&processor.queue_name()).unwrap().unwrap();
    processor.handle_delivery(msg).await.unwrap()
}

#[tokio::test]
#[tracing_test::traced_test]
async fn delivers_a_message_end_to_end() {
    let h = Harness::new();
    let processor = h.processor();
    let body = h.indexed(message(1));
    let msg_hash = body.event.msg_hash;
    h.enqueue(&processor, &body);

    assert_eq!(
        deliver(&h, &processor).await,
        Delivery::Processed(EventStatus::Done)
    );

    assert_eq!(
        h.src.proof_requests(),
        vec![(SIGNAL_SERVICE, vec![storage_key(SRC_BRIDGE, msg_hash)], 95)]
    );
    let submitted = h.dest_bridge.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].0.gas_limit, U256::from(200_000u64));
    assert_eq!(submitted[0].0.gas_price, None);
    assert_eq!(submitted[0].1, body.event.message);

    assert_eq!(h.status_of(body.id), EventStatus::Done);
    let changed = h
        .store
        .first_by_event_and_msg_hash(EventName::MessageStatusChanged, msg_hash)
        .unwrap()
        .unwrap();
    assert_eq!(changed.status, EventStatus::Done);
    assert_eq!(changed.block_id, EVENT_BLOCK);
    assert!(changed.data.contains("transactionHash"));
    assert_eq!(h.metrics.get(counter::PROCESSOR_MESSAGES_DONE), 1);
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 0);
}

#[tokio::test]
async fn retriable_status_is_stored_as_reported() {
    let h = Harness::new();
    h.dest_bridge.set_status_after_process(EventStatus::Retriable);
    let processor = h.processor();
    let body = h.indexed(message(2));
    let status = processor.process_message(body.clone()).await.unwrap();
    assert_eq!(status, EventStatus::Retriable);
    assert_eq!(h.status_of(body.id), EventStatus::Retriable);
    assert_eq!(h.metrics.get(counter::PROCESSOR_MESSAGES_RETRIABLE), 1);
}

#[tokio::test]
async fn zero_gas_limit_is_left_to_the_owner() {
    let h = Harness::new();
    let processor = h.processor();
    let mut owner_only = message(3);
    owner_only.gas_limit = U256::zero();
    let body = h.indexed(owner_only);

    let err = processor.process_message(body.clone()).await.unwrap_err();
    assert!(matches!(err, Error::OnlyOwnerCanProcess));

    h.enqueue(&processor, &body);
    assert_eq!(deliver(&h, &processor).await, Delivery::LeftToOwner);
    assert!(h.dest_bridge.submitted().is_empty());
    assert!(h.src.proof_requests().is_empty());
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 0);
}

#[tokio::test]
async fn unreceived_messages_are_rejected_before_submitting() {
    let h = Harness::new();
    h.dest_bridge.set_received(false);
    let processor = h.processor();
    let body = h.indexed(message(4));
    h.enqueue(&processor, &body);

    assert_eq!(deliver(&h, &processor).await, Delivery::Rejected);
    assert!(h.dest_bridge.submitted().is_empty());
    assert_eq!(h.metrics.get(counter::PROCESSOR_MESSAGE_RECEIVED_FALSE), 1);
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 0);
    assert_eq!(h.status_of(body.id), EventStatus::New);
}

#[tokio::test]
async fn a_wrong_signal_value_fails_before_anything_is_sent() {
    let h = Harness::new();
    h.src.set_proof(SIGNAL_SERVICE, proof(2));
    let processor = h.processor();
    let body = h.indexed(message(5));
    let err = processor.process_message(body).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidStorageValue { found } if found == U256::from(2u64)
    ));
    assert!(h.dest_bridge.submitted().is_empty());
}

#[tokio::test]
async fn unconfirmed_messages_are_requeued_then_dropped() {
    let h = Harness::new();
    let config = ProcessorConfig {
        max_message_retries: 1,
        ..Default::default()
    };
    let processor = h.processor_with(config);
    let mut body = h.indexed(message(6));
    // The source transaction is unknown, so it never gets confirmations.
    body.event.raw.transaction_hash = H256::repeat_byte(0xdd);

    let err = processor.process_message(body.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout("confirmations")));

    h.enqueue(&processor, &body);
    assert_eq!(deliver(&h, &processor).await, Delivery::Requeued);
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 1);
    assert_eq!(deliver(&h, &processor).await, Delivery::Dropped);
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 0);
    assert_eq!(h.metrics.get(counter::PROCESSOR_ERRORS), 2);
    assert_eq!(h.metrics.get(counter::PROCESSOR_MESSAGES_FAILED), 1);
}

#[tokio::test]
async fn waits_for_the_destination_to_sync_the_event_block() {
    let h = Harness::new();
    h.syncer.set_latest(h.src.hash_of(80));
    let processor = h.processor();
    let body = h.indexed(message(7));

    let syncer = h.syncer.clone();
    let later = h.src.hash_of(92);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        syncer.set_latest(later);
    });
    let status = processor.process_message(body).await.unwrap();
    assert_eq!(status, EventStatus::Done);
    assert_eq!(h.src.proof_requests()[0].2, 92);
}

#[tokio::test]
async fn header_sync_wait_is_bounded() {
    let h = Harness::new();
    h.syncer.set_latest(h.src.hash_of(80));
    let processor = h.processor();
    let body = h.indexed(message(8));
    let err = processor.process_message(body).await.unwrap_err();
    assert!(matches!(err, Error::Timeout("header sync")));
    assert!(h.src.proof_requests().is_empty());
}

#[tokio::test]
async fn unprofitable_messages_are_parked() {
    let h = Harness::new();
    h.dest.set_gas_price(1_000_000_000u64);
    let config = ProcessorConfig {
        profitable_only: true,
        ..Default::default()
    };
    let processor = h.processor_with(config);
    let body = h.indexed(message(9));
    h.enqueue(&processor, &body);

    assert_eq!(deliver(&h, &processor).await, Delivery::Unprofitable);
    assert!(h.dest_bridge.submitted().is_empty());
    assert_eq!(h.metrics.get(counter::PROCESSOR_UNPROFITABLE), 1);
    let parked = format!("{}-unprofitable", processor.queue_name());
    assert_eq!(h.store.len(&parked).unwrap(), 1);
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 0);
}

#[tokio::test]
async fn profitable_messages_carry_the_gas_price() {
    let h = Harness::new();
    h.dest.set_gas_price(2u64);
    let config = ProcessorConfig {
        profitable_only: true,
        ..Default::default()
    };
    let processor = h.processor_with(config);
    let mut paid = message(10);
    paid.processing_fee = U256::from(1_000_000u64);
    let body = h.indexed(paid);
    processor.process_message(body).await.unwrap();
    assert_eq!(
        h.dest_bridge.submitted()[0].0.gas_price,
        Some(U256::from(2u64))
    );
}

#[tokio::test]
async fn concurrent_messages_never_share_a_nonce() {
    let h = Harness::new();
    h.dest.set_pending_nonce(40u64);
    h.dest_bridge.set_submit_delay(Duration::from_millis(5));
    let processor = h.processor();
    let bodies: Vec<_> = (0..6).map(|i| h.indexed(message(100 + i))).collect();

    let results = futures::future::join_all(
        bodies.into_iter().map(|b| processor.process_message(b)),
    )
    .await;
    assert!(results.iter().all(|r| r.is_ok()));

    let mut nonces: Vec<u64> = h
        .dest_bridge
        .submitted()
        .iter()
        .map(|(opts, _)| opts.nonce.as_u64())
        .collect();
    nonces.sort_unstable();
    assert_eq!(nonces, (40..46).collect::<Vec<_>>());
}

#[tokio::test]
async fn the_consumer_drains_the_queue() {
    let h = Harness::new();
    let processor = Arc::new(h.processor());
    let bodies: Vec<_> = (0..3).map(|i| h.indexed(message(200 + i))).collect();
    for body in &bodies {
        h.enqueue(&processor, body);
    }
    // A message left in flight by a previous run.
    let _in_flight = h.store.next(&processor.queue_name()).unwrap();

    let running = tokio::spawn(processor.clone().run());
    for _ in 0..300 {
        if bodies.iter().all(|b| h.status_of(b.id) == EventStatus::Done) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(bodies.iter().all(|b| h.status_of(b.id) == EventStatus::Done));
    assert_eq!(h.store.len(&processor.queue_name()).unwrap(), 0);
    running.abort();
}

#[tokio::test]
async fn construction_is_validated() {
    let h = Harness::new();
    let no_confirmations = ProcessorConfig {
        confirmations: 0,
        ..Default::default()
    };
    assert!(matches!(
        Processor::new(h.deps(), no_confirmations),
        Err(Error::InvalidConfig(_))
    ));
    let no_syncer = ProcessorDeps {
        header_syncer: None,
        ..h.deps()
    };
    assert!(matches!(
        Processor::new(no_syncer, ProcessorConfig::default()),
        Err(Error::MissingDependency(_))
    ));
    let zero_bridge = ProcessorDeps {
        src_bridge_address: Address::zero(),
        ..h.deps()
    };
    assert!(matches!(
        Processor::new(zero_bridge, ProcessorConfig::default()),
        Err(Error::MissingDependency(_))
    ));
}
