use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ferrite-chain")]
#[command(about = "A minimal UTXO-model cryptocurrency node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Mint a new keypair and print its address")]
    Createwallet,
    #[command(name = "listaddresses", about = "List the addresses held in the wallet file")]
    ListAddresses,
    #[command(
        name = "createblockchain",
        about = "Initialize the chain with a genesis block paying the subsidy to ADDRESS"
    )]
    Createblockchain {
        #[arg(help = "Address receiving the genesis subsidy")]
        address: String,
    },
    #[command(name = "getbalance", about = "Sum the unspent outputs of an address")]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "send", about = "Build and sign a transaction")]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
        #[arg(help = "1 to mine the block locally, 0 to broadcast the transaction")]
        mine: usize,
    },
    #[command(name = "printchain", about = "Dump every block from tip to genesis")]
    Printchain,
    #[command(name = "reindexutxo", about = "Rebuild the UTXO index from the chain")]
    Reindexutxo,
    #[command(name = "startnode", about = "Start the P2P server")]
    StartNode {
        #[arg(help = "Enable mining and send rewards to ADDRESS")]
        miner: Option<String>,
    },
}
