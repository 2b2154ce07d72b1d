//! Key generation utility
//!
//! Emits Curve25519 key pairs in `.env`-ready form, or derives the public
//! key from an existing private key.

use clap::Parser;

use taiga_crypto::{generate_keypair, SecretKey};

/// Generate taiga key pairs
#[derive(Parser)]
#[command(name = "taiga-keygen")]
#[command(author, version, about)]
struct Cli {
    /// Generate a client key pair
    #[arg(long)]
    client: bool,

    /// Generate a node key pair
    #[arg(long)]
    node: bool,

    /// Derive the public key from a private key (hex)
    #[arg(long, value_name = "HEX")]
    derive: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(hex) = cli.derive {
        let secret = match SecretKey::from_hex(&hex) {
            Ok(secret) => secret,
            Err(_) => {
                eprintln!("Error: private key must be 64 hex characters");
                std::process::exit(1);
            }
        };
        println!("Private: {}", secret.to_hex());
        println!("Public:  {}", secret.public_key().to_hex());
        return;
    }

    if cli.client {
        let (private, public) = generate_keypair();
        println!("# Client keys (add to .env.client)");
        println!("PRIVATE_KEY={}", private.to_hex());
        println!();
        println!("# Add this to .env.node as CLIENT_PUBLIC_KEY");
        println!("CLIENT_PUBLIC_KEY={}", public.to_hex());
        return;
    }

    if cli.node {
        let (private, public) = generate_keypair();
        println!("# Node keys (add to .env.node)");
        println!("NODE_PRIVATE_KEY={}", private.to_hex());
        println!("NODE_PUBLIC_KEY={}", public.to_hex());
        println!();
        println!("# Add NODE_PUBLIC_KEY to .env.client");
        return;
    }

    // Default: generate both sides at once
    println!("=== Generating new key pairs ===");
    println!();

    let (node_private, node_public) = generate_keypair();
    let (client_private, client_public) = generate_keypair();

    println!("# .env.node");
    println!("NODE_PRIVATE_KEY={}", node_private.to_hex());
    println!("NODE_PUBLIC_KEY={}", node_public.to_hex());
    println!("CLIENT_PUBLIC_KEY={}", client_public.to_hex());
    println!();
    println!("# .env.client");
    println!("PRIVATE_KEY={}", client_private.to_hex());
    println!("NODE_PUBLIC_KEY={}", node_public.to_hex());
}
