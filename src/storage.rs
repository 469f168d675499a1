//! 랜덤 액세스 파일 저장소
//!
//! 송신측은 구간 단위로 읽고, 수신측은 도착한 청크를 오프셋 위치에 쓴다.
//! seek + read/write 가 원자적이지 않으므로 파일 핸들은 락으로 보호한다.

use std::io::SeekFrom;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::range::Range;
use crate::{Error, Result};

/// 고정 크기 파일 저장소
#[derive(Debug)]
pub struct FileStorage {
    file: Mutex<File>,
    len: u64,
}

impl FileStorage {
    /// 쓰기용 파일 생성 (기존 내용은 지우고 `len` 크기로 맞춤)
    pub async fn create(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        file.set_len(len).await?;

        debug!("storage created: {:?} ({} bytes)", path, len);
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }

    /// 읽기용으로 기존 파일 열기
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();

        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }

    /// 파일 크기
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 구간 `[start, end]` 읽기
    pub async fn read_range(&self, range: Range) -> Result<Bytes> {
        self.check_bounds(range.start(), range.len())?;

        let mut buf = BytesMut::zeroed(range.len() as usize);
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(range.start())).await?;
        file.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// `offset` 위치에 쓰기
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_bounds(offset, data.len() as u64)?;

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        Ok(())
    }

    /// 디스크에 반영
    pub async fn sync(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    fn check_bounds(&self, offset: u64, len: u64) -> Result<()> {
        let fits = offset
            .checked_add(len)
            .map(|end| end <= self.len)
            .unwrap_or(false);
        if !fits {
            return Err(Error::ChunkOutOfRange {
                offset,
                len,
                size: self.len,
            });
        }
        Ok(())
    }
}
