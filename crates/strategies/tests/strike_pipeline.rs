use async_trait::async_trait;
use ethers::prelude::{Address, ProviderError, Transaction, H256, U256};
use ethers::utils::parse_ether;
use executor::{
    GasStrategy, SequenceAllocator, StrikeConfig, StrikeContract, StrikeExecutor, StrikeParams,
};
use models::EngineError;
use services::{EndpointPool, EngineState, NodeClient, PoolEndpoint};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strategies::{OpportunityFilter, StrikeRunner};
use tokio::sync::mpsc;

const ROUTER: &str = "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24";

/// 内存中的 mempool
struct MempoolNode {
    txs: HashMap<H256, Transaction>,
}

#[async_trait]
impl NodeClient for MempoolNode {
    async fn balance_of(&self, _address: Address) -> Result<U256, ProviderError> {
        Ok(parse_ether("1").unwrap_or_default())
    }

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>, ProviderError> {
        Ok(self.txs.get(&hash).cloned())
    }

    async fn pending_transaction_count(&self, _address: Address) -> Result<U256, ProviderError> {
        Ok(U256::from(3))
    }
}

#[derive(Default)]
struct RecordingContract {
    submitted: Mutex<Vec<u64>>,
}

#[async_trait]
impl StrikeContract for RecordingContract {
    async fn simulate(&self, _params: &StrikeParams) -> Result<(), EngineError> {
        Ok(())
    }

    async fn submit(&self, _params: &StrikeParams, _gas: &GasStrategy, nonce: u64) -> Result<H256, EngineError> {
        self.submitted.lock().unwrap().push(nonce);
        Ok(H256::from_low_u64_be(1_000 + nonce))
    }

    async fn wait_for_receipt(&self, _tx_hash: H256, _poll: Duration) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn contract_balance(&self) -> Result<U256, EngineError> {
        Ok(U256::zero())
    }

    async fn withdraw(&self, _gas: &GasStrategy, nonce: u64) -> Result<H256, EngineError> {
        Ok(H256::from_low_u64_be(nonce))
    }
}

fn pending_tx(n: u64, to: Address, value: U256) -> Transaction {
    Transaction {
        hash: H256::from_low_u64_be(n),
        to: Some(to),
        value,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_qualifying_candidate_becomes_a_win() {
    let router: Address = ROUTER.parse().unwrap();
    let threshold = parse_ether("0.1").unwrap();

    let txs = [
        pending_tx(1, Address::from_low_u64_be(0xdead), parse_ether("5").unwrap()),
        pending_tx(2, router, threshold),
        pending_tx(3, router, threshold + U256::one()),
    ];
    let node = Arc::new(MempoolNode {
        txs: txs.iter().map(|tx| (tx.hash, tx.clone())).collect(),
    });

    let pool = Arc::new(EndpointPool::new(
        vec![PoolEndpoint::new("http://node", 1, Duration::from_secs(10), node)],
        Duration::from_millis(2_500),
    ));
    let sender = Address::from_low_u64_be(0xbeef);
    let allocator = Arc::new(SequenceAllocator::new(pool.clone(), sender));
    let state = Arc::new(EngineState::new());
    let contract = Arc::new(RecordingContract::default());

    let executor = Arc::new(StrikeExecutor::new(
        pool.clone(),
        contract.clone(),
        allocator,
        state.clone(),
        StrikeConfig {
            sender,
            params: StrikeParams {
                token_in: Address::from_low_u64_be(1),
                token_out: Address::from_low_u64_be(2),
                loan_amount: parse_ether("100").unwrap(),
            },
            gas: GasStrategy::default(),
            balance_floor: parse_ether("0.001").unwrap(),
            confirmation_poll: Duration::from_millis(10),
            confirmation_timeout: Duration::from_secs(60),
        },
    ));

    let filter = OpportunityFilter::from_config(&[ROUTER.to_lowercase()], "0.1").unwrap();
    let runner = Arc::new(StrikeRunner::new(pool, filter, executor, 4));

    tokio::time::advance(Duration::from_secs(120)).await;
    assert!(state.idle_for() >= Duration::from_secs(120));
    let wins_before = state.successful_strikes();

    let (tx, rx) = mpsc::channel(16);
    for hash in [1u64, 2, 3, 4] {
        tx.send(H256::from_low_u64_be(hash)).await.unwrap();
    }
    drop(tx);

    runner.run(rx).await;

    assert_eq!(state.successful_strikes(), wins_before + 1);
    assert_eq!(state.candidates_seen(), 1);
    assert!(state.idle_for() < Duration::from_secs(1));
    assert_eq!(*contract.submitted.lock().unwrap(), vec![3]);
}
