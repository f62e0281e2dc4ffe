use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{Config, IndexLifetime};
use crate::error::{RagError, Result};

const FOURCC_FLAT_L2: &[u8; 4] = b"IxF2";
const FOURCC_FLAT_IP: &[u8; 4] = b"IxFI";
const FOURCC_FLAT_LEGACY: &[u8; 4] = b"IxFl";
const METRIC_L2: i32 = 0;
const HEADER_DUMMY: i64 = 1 << 20;

/// Exact squared-L2 index over row-major `f32` vectors, read from and written
/// to the faiss `IndexFlatL2` on-disk layout.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

impl FlatIndex {
    pub fn new(dim: usize, vectors: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(RagError::Resource("index dimension must be positive".to_string()));
        }
        if vectors.len() % dim != 0 {
            return Err(RagError::Resource(format!(
                "{} floats do not divide into rows of {}",
                vectors.len(),
                dim
            )));
        }
        if let Some(pos) = vectors.iter().position(|v| !v.is_finite()) {
            return Err(RagError::Resource(format!(
                "row {} holds a non-finite component",
                pos / dim
            )));
        }
        Ok(Self { dim, vectors })
    }

    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let dim = rows.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = rows.iter().position(|r| r.len() != dim) {
            return Err(RagError::Resource(format!(
                "row {} has {} components, expected {}",
                bad,
                rows[bad].len(),
                dim
            )));
        }
        Self::new(dim, rows.concat())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        self.vectors.chunks_exact(self.dim).nth(row)
    }

    /// The `k` rows nearest to `query` in ascending squared distance. Equal
    /// distances keep row order. Never returns more rows than the index holds.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(RagError::Resource(format!(
                "query has {} dimensions but index has {}",
                query.len(),
                self.dim
            )));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Resource("query holds a non-finite component".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, v)| Neighbor { row, distance: squared_l2(v, query) })
            .collect();
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| RagError::Resource(format!("open {}: {}", path.display(), e)))?;
        Self::read_from(&mut BufReader::new(file)).map_err(|e| match e {
            RagError::Resource(msg) => RagError::Resource(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut fourcc = [0u8; 4];
        read_exact(reader, &mut fourcc)?;
        if &fourcc == FOURCC_FLAT_IP {
            return Err(RagError::Resource(
                "inner-product indexes are not supported, distances must be non-negative".to_string(),
            ));
        }
        if &fourcc != FOURCC_FLAT_L2 && &fourcc != FOURCC_FLAT_LEGACY {
            return Err(RagError::Resource(format!(
                "unsupported index type {:?}, expected a flat index",
                String::from_utf8_lossy(&fourcc)
            )));
        }

        let dim = read_i32(reader)?;
        let ntotal = read_i64(reader)?;
        let _ = read_i64(reader)?;
        let _ = read_i64(reader)?;
        let _is_trained = read_u8(reader)?;
        let metric = read_i32(reader)?;
        if metric > 1 {
            let _metric_arg = read_f32(reader)?;
        }
        if metric != METRIC_L2 {
            return Err(RagError::Resource(format!(
                "unsupported metric type {}, only L2 is supported",
                metric
            )));
        }
        let (dim, ntotal) = match (usize::try_from(dim), usize::try_from(ntotal)) {
            (Ok(d), Ok(n)) if d > 0 => (d, n),
            _ => {
                return Err(RagError::Resource(format!(
                    "corrupt header: d={} ntotal={}",
                    dim, ntotal
                )))
            }
        };

        let count = read_u64(reader)?;
        let expected = dim
            .checked_mul(ntotal)
            .ok_or_else(|| RagError::Resource("index size overflows".to_string()))?;
        if usize::try_from(count).ok() != Some(expected) {
            return Err(RagError::Resource(format!(
                "index stores {} floats, header promises {} x {}",
                count, ntotal, dim
            )));
        }
        let byte_len = expected
            .checked_mul(4)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| RagError::Resource("index size overflows".to_string()))?;
        // The header is untrusted; only buffer what the reader actually holds.
        let mut raw = Vec::new();
        reader
            .by_ref()
            .take(byte_len)
            .read_to_end(&mut raw)
            .map_err(|e| RagError::Resource(format!("read index payload: {}", e)))?;
        if raw.len() as u64 != byte_len {
            return Err(RagError::Resource(format!(
                "truncated index: {} of {} payload bytes present",
                raw.len(),
                byte_len
            )));
        }
        let vectors = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Self::new(dim, vectors)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| RagError::Resource(format!("create {}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer
            .flush()
            .map_err(|e| RagError::Resource(format!("write {}: {}", path.display(), e)))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(45 + self.vectors.len() * 4);
        buf.extend_from_slice(FOURCC_FLAT_L2);
        buf.extend_from_slice(&(self.dim as i32).to_le_bytes());
        buf.extend_from_slice(&(self.len() as i64).to_le_bytes());
        buf.extend_from_slice(&HEADER_DUMMY.to_le_bytes());
        buf.extend_from_slice(&HEADER_DUMMY.to_le_bytes());
        buf.push(1);
        buf.extend_from_slice(&METRIC_L2.to_le_bytes());
        buf.extend_from_slice(&(self.vectors.len() as u64).to_le_bytes());
        for v in &self.vectors {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        writer
            .write_all(&buf)
            .map_err(|e| RagError::Resource(format!("write index: {}", e)))
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|e| RagError::Resource(format!("truncated index: {}", e)))
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    read_exact(reader, &mut b)?;
    Ok(b[0])
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut b = [0u8; 4];
    read_exact(reader, &mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    let mut b = [0u8; 4];
    read_exact(reader, &mut b)?;
    Ok(f32::from_le_bytes(b))
}

fn read_i64<R: Read>(reader: &mut R) -> Result<i64> {
    let mut b = [0u8; 8];
    read_exact(reader, &mut b)?;
    Ok(i64::from_le_bytes(b))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    read_exact(reader, &mut b)?;
    Ok(u64::from_le_bytes(b))
}

/// One metadata record. Fields beyond `text` and `metadata.url` are carried
/// through untouched.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Entry {
    pub text: String,
    pub metadata: EntryMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EntryMetadata {
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn load_metadata(path: &Path) -> Result<Vec<Entry>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| RagError::Resource(format!("open {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| RagError::Resource(format!("{}: invalid metadata: {}", path.display(), e)))
}

/// An index paired with its metadata; row `i` of the index is entry `i`.
#[derive(Clone, Debug)]
pub struct Corpus {
    name: String,
    index: FlatIndex,
    entries: Vec<Entry>,
}

impl Corpus {
    pub fn new(name: impl Into<String>, index: FlatIndex, entries: Vec<Entry>) -> Result<Self> {
        let name = name.into();
        if index.len() != entries.len() {
            return Err(RagError::Resource(format!(
                "{} index has {} rows but metadata has {} entries",
                name,
                index.len(),
                entries.len()
            )));
        }
        Ok(Self { name, index, entries })
    }

    pub fn load(name: &str, index_path: &Path, metadata_path: &Path) -> Result<Self> {
        let index = FlatIndex::load(index_path)?;
        let entries = load_metadata(metadata_path)?;
        let corpus = Self::new(name, index, entries)?;
        info!(corpus = name, rows = corpus.len(), dim = corpus.index.dim(), "loaded corpus");
        Ok(corpus)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn entry(&self, row: usize) -> Option<&Entry> {
        self.entries.get(row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Corpora {
    pub discourse: Corpus,
    pub course: Corpus,
}

impl Corpora {
    pub fn load(cfg: &Config) -> Result<Self> {
        Ok(Self {
            discourse: Corpus::load(
                "discourse",
                &cfg.discourse_index_path(),
                &cfg.discourse_metadata_path(),
            )?,
            course: Corpus::load("course", &cfg.course_index_path(), &cfg.course_metadata_path())?,
        })
    }
}

/// Hands out corpora according to the configured index lifetime.
#[derive(Clone, Debug)]
pub enum CorpusStore {
    Loaded(Arc<Corpora>),
    PerRequest,
}

impl CorpusStore {
    pub fn open(cfg: &Config) -> Result<Self> {
        match cfg.index_lifetime {
            IndexLifetime::Startup => Ok(Self::Loaded(Arc::new(Corpora::load(cfg)?))),
            IndexLifetime::PerRequest => Ok(Self::PerRequest),
        }
    }

    pub fn corpora(&self, cfg: &Config) -> Result<Arc<Corpora>> {
        match self {
            Self::Loaded(corpora) => Ok(Arc::clone(corpora)),
            Self::PerRequest => Ok(Arc::new(Corpora::load(cfg)?)),
        }
    }
}
