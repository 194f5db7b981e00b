//! # Content Hashing Module
//!
//! Calcola il fingerprint del contenuto di un file leggendo a blocchi fissi,
//! così la memoria usata non dipende dalla dimensione del file.
//!
//! ## Responsabilità:
//! - `HashComputer`: digest streaming MD5 o SHA-256 con output hex lowercase
//! - `ContentHasher`: trait usato dalla riconciliazione del manifest, così i test
//!   possono iniettare un hasher deterministico

use crate::config::HashAlgorithm;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// Produces a stable content fingerprint for a file
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> io::Result<String>;
}

/// Streaming file hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct HashComputer {
    algorithm: HashAlgorithm,
}

impl HashComputer {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Hash everything a reader yields
    pub fn hash_reader<R: Read>(&self, reader: R) -> io::Result<String> {
        match self.algorithm {
            HashAlgorithm::Md5 => digest_stream::<Md5, R>(reader),
            HashAlgorithm::Sha256 => digest_stream::<Sha256, R>(reader),
        }
    }
}

impl ContentHasher for HashComputer {
    fn hash_file(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        self.hash_reader(file)
    }
}

fn digest_stream<D: Digest, R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
