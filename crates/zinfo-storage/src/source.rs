//! `RangeSource` implementations: an object behind an OpenDAL operator, or a
//! local file

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use opendal::Operator;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use zinfo_core::{Offset, ZinfoError, ZinfoResult};
use zinfo_index::RangeSource;

/// Clamp `[offset, offset + len)` to a source of `size` bytes.
fn clamp(offset: Offset, len: u64, size: u64) -> (u64, u64) {
    let start = offset.min(size);
    let end = offset.saturating_add(len).min(size);
    (start, end)
}

/// One object read through an operator with ranged GETs.
#[derive(Debug, Clone)]
pub struct OperatorSource {
    op: Operator,
    path: String,
    size: u64,
}

impl OperatorSource {
    /// Stat `path` to learn its size.
    pub async fn open(op: Operator, path: impl Into<String>) -> ZinfoResult<Self> {
        let path = path.into();
        let meta = op
            .stat(&path)
            .await
            .map_err(|e| ZinfoError::Storage(format!("stat {path}: {e}")))?;
        let size = meta.content_length();
        tracing::debug!(%path, size, "opened remote layer");
        Ok(Self { op, path, size })
    }
}

impl RangeSource for OperatorSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(
        &self,
        offset: Offset,
        len: u64,
    ) -> impl Future<Output = ZinfoResult<Bytes>> + Send {
        let (start, end) = clamp(offset, len, self.size);
        async move {
            if start == end {
                return Ok(Bytes::new());
            }
            let buf = self
                .op
                .read_with(&self.path)
                .range(start..end)
                .await
                .map_err(|e| {
                    ZinfoError::Storage(format!("read {} [{start}, {end}): {e}", self.path))
                })?;
            Ok::<_, ZinfoError>(buf.to_bytes())
        }
    }
}

/// A local file. Each read opens its own handle, so concurrent reads do not
/// share a cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> ZinfoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self { path, size })
    }
}

impl RangeSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(
        &self,
        offset: Offset,
        len: u64,
    ) -> impl Future<Output = ZinfoResult<Bytes>> + Send {
        let (start, end) = clamp(offset, len, self.size);
        async move {
            let mut file = tokio::fs::File::open(&self.path).await?;
            file.seek(SeekFrom::Start(start)).await?;
            let mut buf = Vec::with_capacity((end - start) as usize);
            file.take(end - start).read_to_end(&mut buf).await?;
            Ok::<_, ZinfoError>(Bytes::from(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_operator() -> Operator {
        Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish()
    }

    #[test]
    fn clamp_limits_to_size() {
        assert_eq!(clamp(10, 20, 100), (10, 30));
        assert_eq!(clamp(90, 20, 100), (90, 100));
        assert_eq!(clamp(200, 5, 100), (100, 100));
        assert_eq!(clamp(5, u64::MAX, 100), (5, 100));
    }

    #[tokio::test]
    async fn operator_source_reads_ranges() {
        let op = memory_operator();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        op.write("layers/a.gz", data.clone()).await.unwrap();

        let src = OperatorSource::open(op, "layers/a.gz").await.unwrap();
        assert_eq!(src.size(), 5000);
        assert_eq!(src.read_range(100, 50).await.unwrap(), &data[100..150]);
        assert_eq!(src.read_range(4990, 50).await.unwrap(), &data[4990..]);
        assert!(src.read_range(6000, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_object_is_storage_error() {
        let err = OperatorSource::open(memory_operator(), "nope").await.unwrap_err();
        assert!(matches!(err, ZinfoError::Storage(_)));
    }

    #[test]
    fn file_source_reads_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.bin");
        let data: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let src = FileSource::open(&path).unwrap();
        assert_eq!(src.size(), 3000);
        let head = tokio_test::block_on(src.read_range(0, 10)).unwrap();
        assert_eq!(head, &data[..10]);
        let tail = tokio_test::block_on(src.read_range(2995, 10)).unwrap();
        assert_eq!(tail, &data[2995..]);
    }

    #[test]
    fn file_source_missing_file() {
        assert!(matches!(
            FileSource::open("/definitely/not/here"),
            Err(ZinfoError::Io(_))
        ));
    }
}
