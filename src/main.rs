use clap::Parser;
use data_encoding::HEXLOWER;
use ferrite_chain::{
    address_to_pub_key_hash, convert_address, hash_pub_key, send_tx, validate_address, Blockchain,
    Command, Opt, Server, Transaction, UTXOSet, Wallets, CENTRAL_NODE, GLOBAL_CONFIG,
};
use log::{error, LevelFilter};
use std::process;

const MINE_LOCALLY: usize = 1;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("{e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> ferrite_chain::Result<()> {
    let node_id = GLOBAL_CONFIG.get_node_id()?;

    match command {
        Command::Createwallet => {
            let mut wallets = Wallets::new(&node_id)?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new(&node_id)?;
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::Createblockchain { address } => {
            let blockchain = Blockchain::create_blockchain(&address, &node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain);

            let balance: u64 = utxo_set
                .find_utxo(pub_key_hash.as_slice())?
                .iter()
                .map(|out| out.get_value())
                .sum();
            println!("Balance of {address}: {balance}");
        }
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain.clone());

            let wallets = Wallets::new(&node_id)?;
            let wallet = wallets.get_wallet(&from).ok_or_else(|| {
                ferrite_chain::BlockchainError::Wallet(format!("no wallet for address {from}"))
            })?;
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &utxo_set)?;

            if mine == MINE_LOCALLY {
                // Local mining also rewards the sender with a coinbase
                let coinbase = Transaction::new_coinbase_tx(&from)?;
                let block = blockchain.mine_block(&[coinbase, transaction])?;
                utxo_set.update(&block)?;
            } else {
                send_tx(CENTRAL_NODE, &transaction)?;
            }
            println!("Success!");
        }
        Command::Printchain => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            for block in blockchain.iterator() {
                println!("Prev hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Hash:      {}", HEXLOWER.encode(block.get_hash()));
                println!("Height:    {}", block.get_height());
                println!("Timestamp: {}", block.get_timestamp());

                for tx in block.get_transactions() {
                    println!("- Transaction {}", HEXLOWER.encode(tx.get_id()));
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let address = convert_address(
                                hash_pub_key(input.get_pub_key()).as_slice(),
                            );
                            println!(
                                "-- Input txid = {}, vout = {}, from = {address}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        let address = convert_address(output.get_pub_key_hash());
                        println!(
                            "-- Output value = {}, to = {address}",
                            output.get_value(),
                        );
                    }
                }
                println!();
            }
        }
        Command::Reindexutxo => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::StartNode { miner } => {
            if let Some(addr) = &miner {
                if !validate_address(addr) {
                    return Err(ferrite_chain::BlockchainError::InvalidAddress(addr.clone()));
                }
                println!("Mining is on. Address to receive rewards: {addr}");
                GLOBAL_CONFIG.set_mining_addr(addr.clone());
            }

            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let server = Server::new(blockchain);
            server.run(&GLOBAL_CONFIG.get_node_addr())?;
        }
    }
    Ok(())
}
