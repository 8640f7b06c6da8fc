//! End-to-end scenarios over real databases: balances across mined
//! blocks, overdraft rejection, chain persistence, and catch-up of a
//! second node from a shared genesis.

use ferrite_chain::{
    address_to_pub_key_hash, Blockchain, ProofOfWork, Transaction, UTXOSet, Wallet, Wallets,
    SUBSIDY,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn balance(utxo_set: &UTXOSet, address: &str) -> u64 {
    let pub_key_hash = address_to_pub_key_hash(address).unwrap();
    utxo_set
        .find_utxo(pub_key_hash.as_slice())
        .unwrap()
        .iter()
        .map(|out| out.get_value())
        .sum()
}

fn copy_dir(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}

#[test]
fn test_genesis_pays_the_subsidy() {
    let dir = tempdir().unwrap();
    let mut wallets = Wallets::with_file(dir.path().join("wallets.data")).unwrap();
    let address = wallets.create_wallet().unwrap();

    let blockchain =
        Blockchain::create_blockchain_with_path(&address, &dir.path().join("chain")).unwrap();
    let utxo_set = UTXOSet::new(blockchain);
    utxo_set.reindex().unwrap();

    assert_eq!(balance(&utxo_set, &address), SUBSIDY);
    assert_eq!(utxo_set.get_blockchain().get_best_height().unwrap(), 0);
}

#[test]
fn test_send_with_local_mining_updates_balances() {
    let dir = tempdir().unwrap();
    let mut wallets = Wallets::with_file(dir.path().join("wallets.data")).unwrap();
    let a = wallets.create_wallet().unwrap();
    let b = wallets.create_wallet().unwrap();

    let blockchain =
        Blockchain::create_blockchain_with_path(&a, &dir.path().join("chain")).unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().unwrap();

    // Local mining includes a fresh coinbase rewarding the sender
    let wallet_a = wallets.get_wallet(&a).unwrap();
    let tx = Transaction::new_utxo_transaction(wallet_a, &b, 30, &utxo_set).unwrap();
    let coinbase = Transaction::new_coinbase_tx(&a).unwrap();
    let block = blockchain.mine_block(&[coinbase, tx]).unwrap();
    utxo_set.update(&block).unwrap();

    assert_eq!(block.get_transactions().len(), 2);
    assert_eq!(block.get_height(), 1);
    // 100 genesis - 30 sent + 70 change + 100 mining reward
    assert_eq!(balance(&utxo_set, &a), 170);
    assert_eq!(balance(&utxo_set, &b), 30);
}

#[test]
fn test_overdraft_is_rejected_and_chain_unchanged() {
    let dir = tempdir().unwrap();
    let mut wallets = Wallets::with_file(dir.path().join("wallets.data")).unwrap();
    let a = wallets.create_wallet().unwrap();
    let c = wallets.create_wallet().unwrap();

    let blockchain =
        Blockchain::create_blockchain_with_path(&a, &dir.path().join("chain")).unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().unwrap();

    let wallet_a = wallets.get_wallet(&a).unwrap();
    let result = Transaction::new_utxo_transaction(wallet_a, &c, 200, &utxo_set);
    match result {
        Err(ferrite_chain::BlockchainError::InsufficientFunds {
            required,
            available,
        }) => {
            assert_eq!(required, 200);
            assert_eq!(available, SUBSIDY);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    assert_eq!(blockchain.get_best_height().unwrap(), 0);
    assert_eq!(balance(&utxo_set, &a), SUBSIDY);
}

#[test]
fn test_multi_input_spend_drains_several_outputs() {
    let dir = tempdir().unwrap();
    let mut wallets = Wallets::with_file(dir.path().join("wallets.data")).unwrap();
    let a = wallets.create_wallet().unwrap();
    let b = wallets.create_wallet().unwrap();

    let blockchain =
        Blockchain::create_blockchain_with_path(&a, &dir.path().join("chain")).unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().unwrap();

    // Give A a second output so the next spend needs two inputs
    let wallet_a = wallets.get_wallet(&a).unwrap();
    let tx = Transaction::new_utxo_transaction(wallet_a, &b, 30, &utxo_set).unwrap();
    let coinbase = Transaction::new_coinbase_tx(&a).unwrap();
    let block = blockchain.mine_block(&[coinbase, tx]).unwrap();
    utxo_set.update(&block).unwrap();
    assert_eq!(balance(&utxo_set, &a), 170);

    // 150 > any single output A holds (100 and 70)
    let tx2 = Transaction::new_utxo_transaction(wallet_a, &b, 150, &utxo_set).unwrap();
    assert!(tx2.get_vin().len() >= 2);
    let block2 = blockchain.mine_block(&[tx2]).unwrap();
    utxo_set.update(&block2).unwrap();

    assert_eq!(balance(&utxo_set, &a), 20);
    assert_eq!(balance(&utxo_set, &b), 180);
}

#[test]
fn test_incremental_updates_match_full_reindex() {
    let dir = tempdir().unwrap();
    let mut wallets = Wallets::with_file(dir.path().join("wallets.data")).unwrap();
    let a = wallets.create_wallet().unwrap();
    let b = wallets.create_wallet().unwrap();

    let blockchain =
        Blockchain::create_blockchain_with_path(&a, &dir.path().join("chain")).unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().unwrap();

    let wallet_a = wallets.get_wallet(&a).unwrap();
    for amount in [10, 20] {
        let tx = Transaction::new_utxo_transaction(wallet_a, &b, amount, &utxo_set).unwrap();
        let coinbase = Transaction::new_coinbase_tx(&a).unwrap();
        let block = blockchain.mine_block(&[coinbase, tx]).unwrap();
        utxo_set.update(&block).unwrap();
    }

    let incremental = (
        utxo_set.count_transactions().unwrap(),
        balance(&utxo_set, &a),
        balance(&utxo_set, &b),
    );

    utxo_set.reindex().unwrap();
    let rebuilt = (
        utxo_set.count_transactions().unwrap(),
        balance(&utxo_set, &a),
        balance(&utxo_set, &b),
    );

    assert_eq!(incremental, rebuilt);
    assert_eq!(balance(&utxo_set, &b), 30);
}

#[test]
fn test_persisted_blocks_link_and_validate() {
    let dir = tempdir().unwrap();
    let wallet = Wallet::new().unwrap();
    let address = wallet.get_address();
    let chain_path = dir.path().join("chain");

    {
        let blockchain =
            Blockchain::create_blockchain_with_path(&address, &chain_path).unwrap();
        for _ in 0..3 {
            let coinbase = Transaction::new_coinbase_tx(&address).unwrap();
            blockchain.mine_block(&[coinbase]).unwrap();
        }
        blockchain.get_kv().flush().unwrap();
    }

    // Reopen from disk; every stored block still links and validates
    let blockchain = Blockchain::open_blockchain_with_path(&chain_path).unwrap();
    assert_eq!(blockchain.get_best_height().unwrap(), 3);

    let blocks: Vec<_> = blockchain.iterator().collect();
    assert_eq!(blocks.len(), 4);
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].get_pre_block_hash(), pair[1].get_hash());
        assert_eq!(pair[0].get_height(), pair[1].get_height() + 1);
    }
    for block in &blocks {
        assert!(ProofOfWork::validate(block));
    }
}

#[test]
fn test_joining_node_catches_up_to_the_same_tip() {
    let dir = tempdir().unwrap();
    let wallet = Wallet::new().unwrap();
    let address = wallet.get_address();
    let path_a = dir.path().join("node_a");
    let path_b = dir.path().join("node_b");

    // Both nodes start from the same genesis database
    {
        let seed = Blockchain::create_blockchain_with_path(&address, &path_a).unwrap();
        seed.get_kv().flush().unwrap();
    }
    copy_dir(&path_a, &path_b);

    let node_a = Blockchain::open_blockchain_with_path(&path_a).unwrap();
    let node_b = Blockchain::open_blockchain_with_path(&path_b).unwrap();

    for _ in 0..2 {
        let coinbase = Transaction::new_coinbase_tx(&address).unwrap();
        node_a.mine_block(&[coinbase]).unwrap();
    }

    // Feed node A's blocks to node B oldest-first, the order the
    // block-download queue delivers them
    let mut blocks: Vec<_> = node_a.iterator().collect();
    blocks.reverse();
    for block in blocks.iter().skip(1) {
        node_b.add_block(block).unwrap();
    }

    assert_eq!(node_b.get_best_height().unwrap(), node_a.get_best_height().unwrap());
    assert_eq!(node_b.get_tip_hash(), node_a.get_tip_hash());
    assert_eq!(node_b.get_block_hashes(), node_a.get_block_hashes());
}
