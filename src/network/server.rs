// Peer-to-peer gossip over TCP. Every message is one framed payload:
// a 12-byte NUL-padded ASCII command, a 4-byte big-endian body length,
// and a serde_json body. Connections are short-lived; each accepted
// connection is handled on its own thread.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::Nodes;
use crate::storage::{BlockInTransit, MemoryPool, UTXOSet};
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

const NODE_VERSION: usize = 1;

/// Canonical bootstrap node; every joining node dials it first
pub const CENTRAL_NODE: &str = "127.0.0.1:3000";

/// Pooled transactions needed before the central seed mines a block
const MINE_POOL_THRESHOLD: usize = 2;

const COMMAND_WIDTH: usize = 12;
const MAX_BODY_BYTES: u32 = 16 * 1024 * 1024;
const FRAME_DEADLINE: Duration = Duration::from_secs(30);
const DIAL_TIMEOUT: Duration = Duration::from_millis(5000);

static GLOBAL_NODES: Lazy<Nodes> = Lazy::new(Nodes::new);
static GLOBAL_MEMORY_POOL: Lazy<MemoryPool> = Lazy::new(MemoryPool::new);
static GLOBAL_BLOCKS_IN_TRANSIT: Lazy<BlockInTransit> = Lazy::new(BlockInTransit::new);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvKind {
    Block,
    Tx,
}

#[derive(Serialize, Deserialize)]
struct VersionMsg {
    addr_from: String,
    version: usize,
    best_height: usize,
}

#[derive(Serialize, Deserialize)]
struct AddrMsg {
    addr_list: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct GetBlocksMsg {
    addr_from: String,
}

#[derive(Serialize, Deserialize)]
struct GetDataMsg {
    addr_from: String,
    kind: InvKind,
    id: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct InvMsg {
    addr_from: String,
    kind: InvKind,
    items: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct BlockMsg {
    addr_from: String,
    block: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct TxMsg {
    addr_from: String,
    transaction: Vec<u8>,
}

/// Encode the command name into its fixed-width NUL-padded form
fn encode_command(name: &str) -> Result<[u8; COMMAND_WIDTH]> {
    if name.len() > COMMAND_WIDTH || !name.bytes().all(|b| b.is_ascii_lowercase()) {
        return Err(BlockchainError::Protocol(format!("bad command {name:?}")));
    }
    let mut command = [0u8; COMMAND_WIDTH];
    command[..name.len()].copy_from_slice(name.as_bytes());
    Ok(command)
}

fn write_frame<W: Write>(writer: &mut W, command: &str, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| BlockchainError::Protocol("body too large".to_string()))?;
    if len > MAX_BODY_BYTES {
        return Err(BlockchainError::Protocol(format!("body of {len} bytes")));
    }
    writer.write_all(&encode_command(command)?)?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame; `Ok(None)` means the peer closed cleanly between
/// frames. Oversized or malformed frames are protocol errors and the
/// connection gets dropped.
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<(String, Vec<u8>)>> {
    let mut command = [0u8; COMMAND_WIDTH];
    let mut filled = 0;
    while filled < COMMAND_WIDTH {
        let n = reader.read(&mut command[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(BlockchainError::Protocol("truncated command".to_string()));
        }
        filled += n;
    }

    let name_len = command
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(COMMAND_WIDTH);
    let name = std::str::from_utf8(&command[..name_len])
        .map_err(|_| BlockchainError::Protocol("non-ascii command".to_string()))?
        .to_string();
    if name.is_empty() || command[name_len..].iter().any(|&b| b != 0) {
        return Err(BlockchainError::Protocol("malformed command".to_string()));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_BODY_BYTES {
        return Err(BlockchainError::Protocol(format!("body of {len} bytes")));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(Some((name, body)))
}

pub struct Server {
    blockchain: Blockchain,
}

impl Server {
    pub fn new(blockchain: Blockchain) -> Server {
        Server { blockchain }
    }

    /// Bind `addr`, introduce ourselves to the bootstrap node, and
    /// serve incoming connections until the process ends
    pub fn run(&self, addr: &str) -> Result<()> {
        GLOBAL_NODES.add_node(CENTRAL_NODE.to_string());

        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Io(format!("cannot bind {addr}: {e}")))?;
        info!("node listening on {addr}");

        if addr != CENTRAL_NODE {
            let best_height = self.blockchain.get_best_height()?;
            send_version(CENTRAL_NODE, best_height);
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let blockchain = self.blockchain.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(blockchain, stream) {
                            error!("connection handler failed: {e}");
                        }
                    });
                }
                Err(e) => error!("accept failed: {e}"),
            }
        }
        Ok(())
    }
}

fn handle_connection(blockchain: Blockchain, mut stream: TcpStream) -> Result<()> {
    stream
        .set_read_timeout(Some(FRAME_DEADLINE))
        .map_err(|e| BlockchainError::Io(format!("cannot set read deadline: {e}")))?;

    loop {
        match read_frame(&mut stream) {
            Ok(Some((command, body))) => {
                if let Err(e) = serve(&blockchain, command.as_str(), body.as_slice()) {
                    error!("error handling {command}: {e}");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("dropping connection: {e}");
                break;
            }
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

fn serve(blockchain: &Blockchain, command: &str, body: &[u8]) -> Result<()> {
    match command {
        "version" => handle_version(blockchain, decode_body(body)?),
        "addr" => handle_addr(decode_body(body)?),
        "getblocks" => handle_get_blocks(blockchain, decode_body(body)?),
        "getdata" => handle_get_data(blockchain, decode_body(body)?),
        "inv" => handle_inv(decode_body(body)?),
        "block" => handle_block(blockchain, decode_body(body)?),
        "tx" => handle_tx(blockchain, decode_body(body)?),
        unknown => {
            warn!("ignoring unknown command {unknown:?}");
            Ok(())
        }
    }
}

fn decode_body<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| BlockchainError::Protocol(format!("bad body: {e}")))
}

fn handle_version(blockchain: &Blockchain, msg: VersionMsg) -> Result<()> {
    info!(
        "version from {} (height {})",
        msg.addr_from, msg.best_height
    );
    let my_best_height = blockchain.get_best_height()?;

    if my_best_height < msg.best_height {
        send_get_blocks(&msg.addr_from);
    } else if my_best_height > msg.best_height {
        send_version(&msg.addr_from, my_best_height);
    }

    GLOBAL_NODES.add_node(msg.addr_from);
    Ok(())
}

fn handle_addr(msg: AddrMsg) -> Result<()> {
    let mut learned = false;
    for addr in &msg.addr_list {
        if GLOBAL_NODES.add_node(addr.clone()) {
            learned = true;
        }
    }
    info!("known peers: {}", GLOBAL_NODES.len());

    // Pass fresh addresses on; already-known lists die here
    if learned {
        let my_addr = GLOBAL_CONFIG.get_node_addr();
        for node in GLOBAL_NODES.get_nodes() {
            if node != my_addr && !msg.addr_list.contains(&node) {
                send_addr(&node, &msg.addr_list);
            }
        }
    }
    Ok(())
}

fn handle_get_blocks(blockchain: &Blockchain, msg: GetBlocksMsg) -> Result<()> {
    let hashes = blockchain.get_block_hashes();
    send_inv(&msg.addr_from, InvKind::Block, &hashes);
    Ok(())
}

fn handle_get_data(blockchain: &Blockchain, msg: GetDataMsg) -> Result<()> {
    match msg.kind {
        InvKind::Block => {
            if let Some(block) = blockchain.get_block(msg.id.as_slice())? {
                send_block(&msg.addr_from, &block)?;
            } else {
                warn!("requested block {} not found", HEXLOWER.encode(&msg.id));
            }
        }
        InvKind::Tx => {
            let txid_hex = HEXLOWER.encode(msg.id.as_slice());
            if let Some(tx) = GLOBAL_MEMORY_POOL.get(&txid_hex) {
                send_tx_message(&msg.addr_from, &tx)?;
            }
        }
    }
    Ok(())
}

fn handle_inv(msg: InvMsg) -> Result<()> {
    info!(
        "inv with {} {:?} item(s) from {}",
        msg.items.len(),
        msg.kind,
        msg.addr_from
    );
    match msg.kind {
        InvKind::Block => {
            GLOBAL_BLOCKS_IN_TRANSIT.add_blocks(msg.items.as_slice());
            if let Some(first) = msg.items.first() {
                send_get_data(&msg.addr_from, InvKind::Block, first);
                GLOBAL_BLOCKS_IN_TRANSIT.remove(first);
            }
        }
        InvKind::Tx => {
            if let Some(txid) = msg.items.first() {
                if !GLOBAL_MEMORY_POOL.contains(&HEXLOWER.encode(txid)) {
                    send_get_data(&msg.addr_from, InvKind::Tx, txid);
                }
            }
        }
    }
    Ok(())
}

fn handle_block(blockchain: &Blockchain, msg: BlockMsg) -> Result<()> {
    let block = Block::deserialize(msg.block.as_slice())?;
    blockchain.add_block(&block)?;
    info!(
        "accepted block {} from {}",
        HEXLOWER.encode(block.get_hash()),
        msg.addr_from
    );

    if let Some(next) = GLOBAL_BLOCKS_IN_TRANSIT.first() {
        send_get_data(&msg.addr_from, InvKind::Block, next.as_slice());
        GLOBAL_BLOCKS_IN_TRANSIT.remove(next.as_slice());
    } else {
        // Initial download finished; rebuild the index once
        UTXOSet::new(blockchain.clone()).reindex()?;
    }
    Ok(())
}

fn handle_tx(blockchain: &Blockchain, msg: TxMsg) -> Result<()> {
    let tx = Transaction::deserialize(msg.transaction.as_slice())?;
    let txid_hex = HEXLOWER.encode(tx.get_id());

    // An unverifiable transaction is dropped without propagation; the
    // sender is not penalized
    match blockchain.verify_transaction(&tx) {
        Ok(true) => {}
        Ok(false) => {
            warn!("dropping tx {txid_hex}: signature check failed");
            return Ok(());
        }
        Err(e) => {
            warn!("dropping tx {txid_hex}: {e}");
            return Ok(());
        }
    }

    GLOBAL_MEMORY_POOL.add(tx.clone());
    info!("pooled tx {txid_hex} ({} waiting)", GLOBAL_MEMORY_POOL.len());

    let my_addr = GLOBAL_CONFIG.get_node_addr();
    if my_addr == CENTRAL_NODE
        && GLOBAL_MEMORY_POOL.len() >= MINE_POOL_THRESHOLD
        && GLOBAL_CONFIG.is_miner()
    {
        mine_pooled_transactions(blockchain)?;
    } else {
        for node in GLOBAL_NODES.get_nodes() {
            if node != my_addr && node != msg.addr_from {
                send_inv(&node, InvKind::Tx, &[tx.get_id_bytes()]);
            }
        }
    }
    Ok(())
}

/// Mine everything in the pool that still verifies, pay the configured
/// miner, apply the block to the UTXO index, and announce it
fn mine_pooled_transactions(blockchain: &Blockchain) -> Result<()> {
    let mining_address = GLOBAL_CONFIG
        .get_mining_addr()
        .ok_or_else(|| BlockchainError::Config("mining address not configured".to_string()))?;

    let mut txs = vec![Transaction::new_coinbase_tx(&mining_address)?];
    for tx in GLOBAL_MEMORY_POOL.get_all() {
        match blockchain.verify_transaction(&tx) {
            Ok(true) => txs.push(tx),
            _ => {
                let txid_hex = HEXLOWER.encode(tx.get_id());
                warn!("discarding stale tx {txid_hex} from pool");
                GLOBAL_MEMORY_POOL.remove(&txid_hex);
            }
        }
    }
    if txs.len() == 1 {
        info!("nothing mineable in the pool");
        return Ok(());
    }

    let block = blockchain.mine_block(txs.as_slice())?;
    UTXOSet::new(blockchain.clone()).update(&block)?;
    info!("mined block {}", HEXLOWER.encode(block.get_hash()));

    for tx in &txs {
        GLOBAL_MEMORY_POOL.remove(&HEXLOWER.encode(tx.get_id()));
    }

    let my_addr = GLOBAL_CONFIG.get_node_addr();
    for node in GLOBAL_NODES.get_nodes() {
        if node != my_addr {
            send_inv(&node, InvKind::Block, &[block.get_hash_bytes()]);
        }
    }
    Ok(())
}

fn send_version(addr: &str, best_height: usize) {
    let msg = VersionMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        version: NODE_VERSION,
        best_height,
    };
    send_message(addr, "version", &msg);
}

fn send_addr(addr: &str, addr_list: &[String]) {
    let msg = AddrMsg {
        addr_list: addr_list.to_vec(),
    };
    send_message(addr, "addr", &msg);
}

fn send_get_blocks(addr: &str) {
    let msg = GetBlocksMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
    };
    send_message(addr, "getblocks", &msg);
}

fn send_get_data(addr: &str, kind: InvKind, id: &[u8]) {
    let msg = GetDataMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        kind,
        id: id.to_vec(),
    };
    send_message(addr, "getdata", &msg);
}

fn send_inv(addr: &str, kind: InvKind, items: &[Vec<u8>]) {
    let msg = InvMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        kind,
        items: items.to_vec(),
    };
    send_message(addr, "inv", &msg);
}

fn send_block(addr: &str, block: &Block) -> Result<()> {
    let msg = BlockMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        block: block.serialize()?,
    };
    send_message(addr, "block", &msg);
    Ok(())
}

fn send_tx_message(addr: &str, tx: &Transaction) -> Result<()> {
    let msg = TxMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        transaction: tx.serialize()?,
    };
    send_message(addr, "tx", &msg);
    Ok(())
}

/// Ship a transaction built by the CLI to a node
pub fn send_tx(addr: &str, tx: &Transaction) -> Result<()> {
    let msg = TxMsg {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        transaction: tx.serialize()?,
    };
    let body = serde_json::to_vec(&msg)
        .map_err(|e| BlockchainError::Serialization(format!("body encode failed: {e}")))?;
    dial_and_send(addr, "tx", body.as_slice())
}

/// Best-effort send used by the gossip handlers: a peer that cannot be
/// reached is dropped from the known set and the operation continues
fn send_message<T: Serialize>(addr: &str, command: &str, msg: &T) {
    let body = match serde_json::to_vec(msg) {
        Ok(body) => body,
        Err(e) => {
            error!("body encode failed for {command}: {e}");
            return;
        }
    };
    if let Err(e) = dial_and_send(addr, command, body.as_slice()) {
        warn!("peer {addr} unreachable ({e}), evicting");
        GLOBAL_NODES.evict_node(addr);
    }
}

fn dial_and_send(addr: &str, command: &str, body: &[u8]) -> Result<()> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| BlockchainError::Protocol(format!("bad peer address {addr}: {e}")))?;
    let mut stream = TcpStream::connect_timeout(&socket_addr, DIAL_TIMEOUT)
        .map_err(|e| BlockchainError::Io(format!("cannot dial {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(FRAME_DEADLINE))
        .map_err(|e| BlockchainError::Io(format!("cannot set write deadline: {e}")))?;
    write_frame(&mut stream, command, body)
}
