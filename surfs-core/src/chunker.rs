use crate::error::{Result, SurfsError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Default block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// A content-addressed block: the bytes plus the Base64 SHA-256 of those bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub data: Bytes,
}

impl Block {
    pub fn new(data: Bytes) -> Self {
        let hash = compute_hash(&data);
        Self { hash, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Compute the Base64-encoded SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

/// Verify that data matches the expected hash
pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual_hash = compute_hash(data);
    if actual_hash != expected_hash {
        return Err(SurfsError::HashMismatch {
            expected: expected_hash.to_string(),
            actual: actual_hash,
        });
    }
    Ok(())
}

/// Decode a block hash back into the raw SHA256 digest.
///
/// Returns `None` for anything that is not the Base64 encoding of exactly 32 bytes.
pub fn decode_hash(hash: &str) -> Option<[u8; 32]> {
    let raw = STANDARD.decode(hash).ok()?;
    raw.try_into().ok()
}

/// Splits a byte source into fixed-size blocks.
///
/// Every block except possibly the last is exactly `block_size` bytes long.
/// The source is either an in-memory buffer or a file on disk. A file is read
/// one block at a time and reopened on every pass, so [`Chunker::blocks`] can
/// be called any number of times without holding the whole file in memory.
#[derive(Debug, Clone)]
pub struct Chunker {
    source: Source,
    block_size: usize,
}

#[derive(Debug, Clone)]
enum Source {
    Memory(Bytes),
    File { path: PathBuf, len: u64 },
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(SurfsError::InvalidRequest(
            "block size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl Chunker {
    pub fn new(data: impl Into<Bytes>, block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        Ok(Self {
            source: Source::Memory(data.into()),
            block_size,
        })
    }

    pub fn with_default_size(data: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Memory(data.into()),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Chunk a regular file, reading it lazily block by block
    pub fn from_path(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;

        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(SurfsError::InvalidRequest(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(Self {
            source: Source::File {
                path: path.to_path_buf(),
                len: metadata.len(),
            },
            block_size,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total number of source bytes
    pub fn len(&self) -> u64 {
        match &self.source {
            Source::Memory(data) => data.len() as u64,
            Source::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blocks(&self) -> Blocks {
        let reader = match &self.source {
            Source::Memory(data) => BlockReader::Memory {
                data: data.clone(),
                offset: 0,
            },
            Source::File { path, .. } => BlockReader::File {
                path: path.clone(),
                file: None,
                done: false,
            },
        };
        Blocks {
            reader,
            block_size: self.block_size,
        }
    }

    /// Ordered hash list describing the source
    pub fn hash_list(&self) -> Result<Vec<String>> {
        self.blocks().map(|block| block.map(|block| block.hash)).collect()
    }
}

/// Lazy iterator over the blocks of a [`Chunker`].
///
/// In-memory blocks share the source buffer. File blocks are read on demand
/// and a read error ends the iteration after it is yielded.
#[derive(Debug)]
pub struct Blocks {
    reader: BlockReader,
    block_size: usize,
}

#[derive(Debug)]
enum BlockReader {
    Memory {
        data: Bytes,
        offset: usize,
    },
    File {
        path: PathBuf,
        file: Option<File>,
        done: bool,
    },
}

impl Iterator for Blocks {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Result<Block>> {
        match &mut self.reader {
            BlockReader::Memory { data, offset } => {
                if *offset >= data.len() {
                    return None;
                }

                let end = (*offset + self.block_size).min(data.len());
                let block = Block::new(data.slice(*offset..end));
                *offset = end;
                Some(Ok(block))
            }
            BlockReader::File { path, file, done } => {
                if *done {
                    return None;
                }

                match read_block(path, file, self.block_size) {
                    Ok(Some(block)) => Some(Ok(block)),
                    Ok(None) => {
                        *done = true;
                        None
                    }
                    Err(e) => {
                        *done = true;
                        Some(Err(e))
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.reader {
            BlockReader::Memory { data, offset } => {
                let count = (data.len() - offset).div_ceil(self.block_size);
                (count, Some(count))
            }
            BlockReader::File { done: true, .. } => (0, Some(0)),
            BlockReader::File { .. } => (0, None),
        }
    }
}

/// Read the next block from the file, opening it on first use
fn read_block(path: &Path, file: &mut Option<File>, block_size: usize) -> Result<Option<Block>> {
    let handle = match file {
        Some(handle) => handle,
        None => file.insert(File::open(path)?),
    };

    let mut buf = Vec::with_capacity(block_size);
    handle.take(block_size as u64).read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(Block::new(Bytes::from(buf))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_blocks(chunker: &Chunker) -> Vec<Block> {
        chunker.blocks().collect::<Result<Vec<_>>>().unwrap()
    }

    fn reassemble(chunker: &Chunker) -> Vec<u8> {
        collect_blocks(chunker)
            .into_iter()
            .flat_map(|block| block.data.to_vec())
            .collect()
    }

    #[test]
    fn test_compute_hash() {
        assert_eq!(
            compute_hash(b"hello world"),
            "uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek="
        );
        assert_eq!(
            compute_hash(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_eq!(compute_hash(b"block1"), compute_hash(b"block1"));
        assert_ne!(compute_hash(b"block1"), compute_hash(b"block2"));
    }

    #[test]
    fn test_verify_hash() {
        let hash = compute_hash(b"payload");
        assert!(verify_hash(b"payload", &hash).is_ok());

        match verify_hash(b"tampered", &hash) {
            Err(SurfsError::HashMismatch { expected, actual }) => {
                assert_eq!(expected, hash);
                assert_eq!(actual, compute_hash(b"tampered"));
            }
            other => panic!("expected hash mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_hash() {
        let hash = compute_hash(b"abc");
        let digest = decode_hash(&hash).unwrap();
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        assert!(decode_hash("hash1").is_none());
        assert!(decode_hash("").is_none());
        assert!(decode_hash("YWJj").is_none());
    }

    #[test]
    fn test_blocks_with_size() {
        let chunker = Chunker::new(&b"abcdefghijklmn"[..], 4).unwrap();
        let blocks = collect_blocks(&chunker);

        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].data, Bytes::from_static(b"abcd"));
        assert_eq!(blocks[3].data, Bytes::from_static(b"mn"));
    }

    #[test]
    fn test_hash_list_order() {
        let chunker = Chunker::new(&b"abcd"[..], 2).unwrap();
        assert_eq!(
            chunker.hash_list().unwrap(),
            vec![compute_hash(b"ab"), compute_hash(b"cd")]
        );
    }

    #[test]
    fn test_exact_multiple_has_no_short_block() {
        let chunker = Chunker::new(vec![7u8; 4096 * 3], DEFAULT_BLOCK_SIZE).unwrap();
        let blocks = collect_blocks(&chunker);

        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|block| block.len() == DEFAULT_BLOCK_SIZE));
    }

    #[test]
    fn test_empty_input() {
        let chunker = Chunker::with_default_size(Vec::new());
        assert!(chunker.is_empty());
        assert_eq!(chunker.blocks().count(), 0);
        assert!(chunker.hash_list().unwrap().is_empty());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            Chunker::new(&b"abc"[..], 0),
            Err(SurfsError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_reassemble_round_trip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();

        for size in [1, 2, 3, 7, 64, 4096, 9_999, 10_000, 20_000] {
            let chunker = Chunker::new(data.clone(), size).unwrap();
            assert_eq!(reassemble(&chunker), data, "size {}", size);
            assert_eq!(chunker.blocks().size_hint().0, data.len().div_ceil(size));
            assert_eq!(chunker.blocks().count(), data.len().div_ceil(size));

            let last = chunker.blocks().last().unwrap().unwrap();
            assert!(!last.is_empty() && last.len() <= size);
        }
    }

    #[test]
    fn test_blocks_are_restartable() {
        let chunker = Chunker::new(&b"the quick brown fox"[..], 5).unwrap();

        let first = collect_blocks(&chunker);
        let second = collect_blocks(&chunker);
        assert_eq!(first, second);

        let again = Chunker::new(&b"the quick brown fox"[..], 5).unwrap();
        assert_eq!(again.hash_list().unwrap(), chunker.hash_list().unwrap());
    }

    #[test]
    fn test_file_source_matches_memory_source() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 17 % 253) as u8).collect();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("source.bin");
        std::fs::write(&path, &data).unwrap();

        for size in [1, 7, 4096, 10_000, 20_000] {
            let from_file = Chunker::from_path(&path, size).unwrap();
            let in_memory = Chunker::new(data.clone(), size).unwrap();

            assert_eq!(from_file.len(), data.len() as u64);
            assert_eq!(collect_blocks(&from_file), collect_blocks(&in_memory), "size {}", size);
            assert_eq!(reassemble(&from_file), data);
        }
    }

    #[test]
    fn test_file_source_is_read_on_each_pass() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("source.bin");
        std::fs::write(&path, b"abcdef").unwrap();

        let chunker = Chunker::from_path(&path, 4).unwrap();
        assert_eq!(
            chunker.hash_list().unwrap(),
            vec![compute_hash(b"abcd"), compute_hash(b"ef")]
        );

        // Nothing is buffered between passes
        std::fs::write(&path, b"ABCDEF").unwrap();
        assert_eq!(
            chunker.hash_list().unwrap(),
            vec![compute_hash(b"ABCD"), compute_hash(b"EF")]
        );

        std::fs::remove_file(&path).unwrap();
        let mut blocks = chunker.blocks();
        assert!(matches!(blocks.next(), Some(Err(SurfsError::Io(_)))));
        assert!(blocks.next().is_none());
    }

    #[test]
    fn test_from_path_rejects_non_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Chunker::from_path(temp_dir.path(), 4),
            Err(SurfsError::InvalidRequest(_))
        ));
        assert!(matches!(
            Chunker::from_path(temp_dir.path().join("absent"), 4),
            Err(SurfsError::Io(_))
        ));

        let path = temp_dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        let chunker = Chunker::from_path(&path, 4).unwrap();
        assert!(chunker.is_empty());
        assert!(chunker.hash_list().unwrap().is_empty());
        assert!(matches!(
            Chunker::from_path(&path, 0),
            Err(SurfsError::InvalidRequest(_))
        ));
    }
}
