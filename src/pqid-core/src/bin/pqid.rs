//! pqid CLI - post-quantum identity issuance and verification.
//!
//! Every artifact is read and written as PEM. Keys go in `PRIVATE KEY` /
//! `PUBLIC KEY` blocks, everything else under its own label.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pqid_core::codec::{self, LABEL_PRIVATE_KEY, LABEL_PUBLIC_KEY};
use pqid_core::{
    Certificate, Csr, IdentityEngine, PkiConfig, Signature, SoftwareEngineLoader, SubjectInfo,
    BUILD_TARGET, VERSION,
};
use serde::Serialize;

/// pqid - ML-DSA-65 keys, CSRs, certificates and signatures.
#[derive(Parser)]
#[command(name = "pqid")]
#[command(version = VERSION)]
#[command(about = "Post-quantum identity issuance and verification")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Accept loosely framed PEM input (missing or mismatched markers)
    #[arg(long)]
    lenient_pem: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair
    Keygen {
        /// Private key output
        #[arg(long, default_value = "private.pem")]
        private_key: PathBuf,

        /// Public key output
        #[arg(long, default_value = "public.pem")]
        public_key: PathBuf,
    },

    /// Create a certificate signing request
    Csr {
        #[arg(long)]
        private_key: PathBuf,

        #[arg(long)]
        public_key: PathBuf,

        /// Subject attribute, in order (repeat: --subject C=US --subject CN=example.com)
        #[arg(long, required = true)]
        subject: Vec<String>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Issue a self-signed CA certificate from a CSR
    SelfSign {
        #[arg(long)]
        private_key: PathBuf,

        #[arg(long)]
        csr: PathBuf,

        /// Validity in days
        #[arg(long)]
        days: Option<u32>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Issue a certificate for a CSR, signed by a CA
    Issue {
        #[arg(long)]
        ca_key: PathBuf,

        #[arg(long)]
        ca_cert: PathBuf,

        #[arg(long)]
        csr: PathBuf,

        /// Validity in days
        #[arg(long)]
        days: Option<u32>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Sign a message
    Sign {
        #[arg(long)]
        private_key: PathBuf,

        #[command(flatten)]
        message: MessageArgs,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Verify a signature against a public key or a certificate
    Verify {
        /// Public key (exclusive with --certificate)
        #[arg(long, conflicts_with = "certificate", required_unless_present = "certificate")]
        public_key: Option<PathBuf>,

        #[arg(long)]
        certificate: Option<PathBuf>,

        #[arg(long)]
        signature: PathBuf,

        #[command(flatten)]
        message: MessageArgs,
    },

    /// Check that a certificate was issued by a CA certificate
    CheckIssuer {
        #[arg(long)]
        certificate: PathBuf,

        #[arg(long)]
        ca_cert: PathBuf,
    },

    /// Decode and display a certificate or CSR
    Info {
        /// PEM file holding a CERTIFICATE or CERTIFICATE REQUEST
        path: PathBuf,
    },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct MessageArgs {
    /// Message text
    #[arg(long)]
    message: Option<String>,

    /// File whose raw bytes are the message
    #[arg(long)]
    input: Option<PathBuf>,
}

impl MessageArgs {
    fn bytes(&self) -> Result<Vec<u8>> {
        match (&self.message, &self.input) {
            (Some(text), _) => Ok(text.as_bytes().to_vec()),
            (None, Some(path)) => {
                fs::read(path).with_context(|| format!("reading {}", path.display()))
            },
            (None, None) => anyhow::bail!("either --message or --input is required"),
        }
    }
}

struct PemReader {
    lenient: bool,
}

impl PemReader {
    fn read(&self, path: &Path, label: &str) -> Result<Vec<u8>> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let bytes = if self.lenient {
            codec::from_pem_lenient(&text)
        } else {
            codec::from_pem_labeled(&text, label)
        };
        bytes.with_context(|| format!("decoding {} as {label}", path.display()))
    }
}

fn write_pem(path: &Path, bytes: &[u8], label: &str) -> Result<()> {
    fs::write(path, codec::to_pem(bytes, label))
        .with_context(|| format!("writing {}", path.display()))
}

#[derive(Serialize)]
struct Written<'a> {
    kind: &'a str,
    path: String,
    size: usize,
    fingerprint: String,
}

#[derive(Serialize)]
struct Verdict<'a> {
    check: &'a str,
    valid: bool,
}

fn report_written(json: bool, kind: &str, path: &Path, bytes: &[u8]) -> Result<()> {
    let written = Written {
        kind,
        path: path.display().to_string(),
        size: bytes.len(),
        fingerprint: codec::fingerprint(bytes),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&written)?);
    } else {
        println!(
            "{} written to {} ({} bytes, sha256 {})",
            written.kind, written.path, written.size, written.fingerprint
        );
    }
    Ok(())
}

fn report_verdict(json: bool, check: &str, valid: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(&Verdict { check, valid })?);
    } else if valid {
        println!("{check}: OK");
    } else {
        println!("{check}: FAILED");
    }
    Ok(if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn show_info(json: bool, pem: &PemReader, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_csr = text.contains(Csr::PEM_LABEL);

    if is_csr {
        let csr = Csr::from(pem.read(path, Csr::PEM_LABEL)?);
        let record = csr.record()?;
        if json {
            let output = serde_json::json!({
                "type": "csr",
                "subject": record.subject,
                "public_key_fingerprint": codec::fingerprint(&record.public_key),
                "fingerprint": codec::fingerprint(csr.as_bytes()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Certificate request");
            println!("  Subject:     {}", record.subject);
            println!("  Public key:  sha256 {}", codec::fingerprint(&record.public_key));
            println!("  Fingerprint: {}", codec::fingerprint(csr.as_bytes()));
        }
        return Ok(());
    }

    let certificate = Certificate::from(pem.read(path, Certificate::PEM_LABEL)?);
    let record = certificate.record()?;
    if json {
        let mut output = serde_json::to_value(&record)?;
        output["type"] = "certificate".into();
        output["self_issued"] = record.is_self_issued().into();
        output["fingerprint"] = codec::fingerprint(certificate.as_bytes()).into();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let timestamp = |secs: i64| {
            chrono::DateTime::from_timestamp(secs, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| secs.to_string())
        };
        println!("Certificate");
        println!("  Serial:      {}", hex::encode(record.serial));
        println!("  Subject:     {}", record.subject);
        println!("  Issuer:      {}", record.issuer);
        println!("  Not before:  {}", timestamp(record.not_before));
        println!("  Not after:   {}", timestamp(record.not_after));
        println!("  CA:          {}", record.is_ca);
        println!("  Self-issued: {}", record.is_self_issued());
        println!("  Subject KID: {}", hex::encode(record.subject_key_id));
        println!("  Issuer KID:  {}", hex::encode(record.authority_key_id));
        println!("  Fingerprint: {}", codec::fingerprint(certificate.as_bytes()));
    }
    Ok(())
}

async fn run(cli: Cli, json: bool) -> Result<ExitCode> {
    let pem = PemReader {
        lenient: cli.lenient_pem,
    };
    let engine = IdentityEngine::initialized(PkiConfig::default(), &SoftwareEngineLoader::default())
        .await
        .context("initializing engine")?;
    tracing::debug!(build_target = BUILD_TARGET, "pqid ready");

    match cli.command {
        Commands::Keygen {
            private_key,
            public_key,
        } => {
            let key_pair = engine.generate_key_pair().await?;
            write_pem(&private_key, key_pair.private_key(), LABEL_PRIVATE_KEY)?;
            write_pem(&public_key, key_pair.public_key(), LABEL_PUBLIC_KEY)?;
            report_written(json, "private key", &private_key, key_pair.private_key())?;
            report_written(json, "public key", &public_key, key_pair.public_key())?;
        },
        Commands::Csr {
            private_key,
            public_key,
            subject,
            out,
        } => {
            let private_key = pem.read(&private_key, LABEL_PRIVATE_KEY)?;
            let public_key = pem.read(&public_key, LABEL_PUBLIC_KEY)?;
            let subject = SubjectInfo::new(subject)?;
            let csr = engine
                .generate_csr(&private_key, &public_key, &subject)
                .await?;
            write_pem(&out, csr.as_bytes(), Csr::PEM_LABEL)?;
            report_written(json, "CSR", &out, csr.as_bytes())?;
        },
        Commands::SelfSign {
            private_key,
            csr,
            days,
            out,
        } => {
            let private_key = pem.read(&private_key, LABEL_PRIVATE_KEY)?;
            let csr = pem.read(&csr, Csr::PEM_LABEL)?;
            let certificate = engine
                .generate_self_signed_certificate(&private_key, csr, days)
                .await?;
            write_pem(&out, certificate.as_bytes(), Certificate::PEM_LABEL)?;
            report_written(json, "certificate", &out, certificate.as_bytes())?;
        },
        Commands::Issue {
            ca_key,
            ca_cert,
            csr,
            days,
            out,
        } => {
            let ca_key = pem.read(&ca_key, LABEL_PRIVATE_KEY)?;
            let ca_cert = pem.read(&ca_cert, Certificate::PEM_LABEL)?;
            let csr = pem.read(&csr, Csr::PEM_LABEL)?;
            let certificate = engine.sign_certificate(&ca_key, csr, ca_cert, days).await?;
            write_pem(&out, certificate.as_bytes(), Certificate::PEM_LABEL)?;
            report_written(json, "certificate", &out, certificate.as_bytes())?;
        },
        Commands::Sign {
            private_key,
            message,
            out,
        } => {
            let private_key = pem.read(&private_key, LABEL_PRIVATE_KEY)?;
            let signature = engine.sign(&private_key, message.bytes()?).await?;
            write_pem(&out, signature.as_bytes(), Signature::PEM_LABEL)?;
            report_written(json, "signature", &out, signature.as_bytes())?;
        },
        Commands::Verify {
            public_key,
            certificate,
            signature,
            message,
        } => {
            let signature = pem.read(&signature, Signature::PEM_LABEL)?;
            let message = message.bytes()?;
            let valid = match (public_key, certificate) {
                (Some(path), _) => {
                    let public_key = pem.read(&path, LABEL_PUBLIC_KEY)?;
                    engine.verify(&public_key, signature, message).await?
                },
                (None, Some(path)) => {
                    let certificate = pem.read(&path, Certificate::PEM_LABEL)?;
                    engine
                        .verify_with_certificate(certificate, signature, message)
                        .await?
                },
                (None, None) => anyhow::bail!("either --public-key or --certificate is required"),
            };
            return report_verdict(json, "signature", valid);
        },
        Commands::CheckIssuer {
            certificate,
            ca_cert,
        } => {
            let certificate = pem.read(&certificate, Certificate::PEM_LABEL)?;
            let ca_cert = pem.read(&ca_cert, Certificate::PEM_LABEL)?;
            let valid = engine
                .verify_certificate_issued_by_ca(certificate, ca_cert)
                .await?;
            return report_verdict(json, "issuer", valid);
        },
        Commands::Info { path } => show_info(json, &pem, &path)?,
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let json_output = cli.format == "json";

    // Initialize logging (suppress for JSON output)
    if json_output {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    run(cli, json_output).await
}
