// CLI commands

use crate::config::LedgerConfig;
use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use crate::network::Node;
use crate::storage::{Blockchain, Storage, UtxoSet};
use crate::wallet::{Address, TransactionBuilder, Wallets};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "utxo-ledger")]
#[command(about = "Minimal UTXO ledger with proof of work", long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a blockchain and send the genesis reward to ADDRESS
    #[command(name = "createblockchain")]
    CreateBlockchain {
        #[arg(long)]
        address: String,
    },

    /// Generate a new key pair and save it to the wallet file
    #[command(name = "createwallet")]
    CreateWallet,

    /// List all addresses from the wallet file
    #[command(name = "listaddresses")]
    ListAddresses,

    /// Get balance of ADDRESS
    #[command(name = "getbalance")]
    GetBalance {
        #[arg(long)]
        address: String,
    },

    /// Send AMOUNT from FROM to TO and mine the block locally
    #[command(name = "send")]
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        amount: u64,
    },

    /// Print all the blocks of the blockchain
    #[command(name = "printchain")]
    PrintChain,

    /// Rebuild the UTXO set
    #[command(name = "reindexutxo")]
    ReindexUtxo,

    /// Get blockchain info
    #[command(name = "info")]
    Info,
}

/// CLI handler
pub struct CliHandler {
    config: LedgerConfig,
    storage: Storage,
}

impl CliHandler {
    /// Open the database under the configured data directory
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let storage = Storage::open(&config.data_dir)?;
        Ok(Self { config, storage })
    }

    /// Handle CLI command
    pub fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::CreateBlockchain { address } => self.create_blockchain(&address),
            Commands::CreateWallet => self.create_wallet(),
            Commands::ListAddresses => self.list_addresses(),
            Commands::GetBalance { address } => self.get_balance(&address),
            Commands::Send { from, to, amount } => self.send(&from, &to, amount),
            Commands::PrintChain => self.print_chain(),
            Commands::ReindexUtxo => self.reindex_utxo(),
            Commands::Info => self.info(),
        }
    }

    fn wallets(&self) -> Result<Wallets> {
        Wallets::load_or_default(self.config.wallet_path())
    }

    fn create_blockchain(&self, address: &str) -> Result<()> {
        let address: Address = address.parse()?;
        let chain = Blockchain::create(&self.storage, &address.to_pub_key_hash()?, &self.config)?;
        UtxoSet::new(&chain).reindex()?;
        self.storage.flush()?;

        println!("Created blockchain, genesis block {}", chain.tip()?);
        Ok(())
    }

    fn create_wallet(&self) -> Result<()> {
        let mut wallets = self.wallets()?;
        let address = wallets.create_wallet();
        wallets.save(self.config.wallet_path())?;

        println!("Your new address: {}", address);
        Ok(())
    }

    fn list_addresses(&self) -> Result<()> {
        for address in self.wallets()?.addresses() {
            println!("{}", address);
        }
        Ok(())
    }

    fn get_balance(&self, address: &str) -> Result<()> {
        let address: Address = address.parse()?;
        let chain = Blockchain::open(&self.storage, &self.config)?;

        let balance = UtxoSet::new(&chain).get_balance(&address.to_pub_key_hash()?)?;
        println!("Balance of '{}': {}", address, balance);
        Ok(())
    }

    fn send(&self, from: &str, to: &str, amount: u64) -> Result<()> {
        let from: Address = from.parse()?;
        let to: Address = to.parse()?;
        let wallets = self.wallets()?;
        if wallets.get_wallet(&from).is_err() {
            return Err(LedgerError::WalletNotFound(from.to_string()));
        }

        let node = Node::new(Blockchain::open(&self.storage, &self.config)?);
        let utxo_set = node.utxo_set();

        let tx = TransactionBuilder::new(&wallets, &utxo_set).build(&from, &to, amount)?;
        let reward = Transaction::coinbase(&from.to_pub_key_hash()?, b"", node.blockchain().subsidy());
        let block = node.mine(vec![reward, tx])?;
        self.storage.flush()?;

        println!("Success! Block {} at height {}", block.hash, block.height);
        Ok(())
    }

    fn print_chain(&self) -> Result<()> {
        let chain = Blockchain::open(&self.storage, &self.config)?;

        for block in chain.iter()? {
            self.print_block(&chain, &block?);
        }
        Ok(())
    }

    fn reindex_utxo(&self) -> Result<()> {
        let chain = Blockchain::open(&self.storage, &self.config)?;
        let utxo_set = UtxoSet::new(&chain);

        utxo_set.reindex()?;
        self.storage.flush()?;

        println!(
            "Done! There are {} transactions in the UTXO set.",
            utxo_set.count_transactions()?
        );
        Ok(())
    }

    fn info(&self) -> Result<()> {
        let chain = Blockchain::open(&self.storage, &self.config)?;
        let utxo_set = UtxoSet::new(&chain);

        println!("Blockchain Info:");
        println!("  Data dir: {}", self.config.data_dir.display());
        println!("  Height: {}", chain.get_best_height()?);
        println!("  Best block: {}", chain.tip()?);
        println!("  Target bits: {}", chain.pow().target_bits());
        println!("  Subsidy: {}", chain.subsidy());
        println!("  UTXO transactions: {}", utxo_set.count_transactions()?);
        println!("  Wallets: {}", self.wallets()?.len());
        Ok(())
    }

    /// Print block information
    fn print_block(&self, chain: &Blockchain, block: &Block) {
        println!("============ Block {} ============", block.hash);
        println!("Height: {}", block.height);
        match &block.prev_block_hash {
            Some(prev) => println!("Prev. block: {}", prev),
            None => println!("Prev. block: (genesis)"),
        }
        println!("Timestamp: {}", block.timestamp);
        println!("Nonce: {}", block.nonce);
        println!("PoW: {}", chain.pow().validate(block));

        for tx in &block.transactions {
            print_transaction(tx);
        }
        println!();
    }
}

fn print_transaction(tx: &Transaction) {
    println!("--- Transaction {}:", tx.id);
    for (i, input) in tx.vin.iter().enumerate() {
        println!("     Input {}:", i);
        match &input.txid {
            Some(txid) => println!("       TXID:      {}", txid),
            None => println!("       TXID:      (coinbase)"),
        }
        println!("       Out:       {}", input.vout);
        println!("       Signature: {}", hex::encode(&input.signature));
        println!("       PubKey:    {}", hex::encode(&input.pub_key));
    }
    for (i, output) in tx.vout.iter().enumerate() {
        println!("     Output {}:", i);
        println!("       Value:   {}", output.value);
        println!("       Address: {}", Address::from_pub_key_hash(&output.pub_key_hash));
    }
}
