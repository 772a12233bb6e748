//! 플랫폼 파일 접근 프리미티브
//!
//! tail 대상 파일은 외부 로테이터가 언제든 rename/delete/append 할 수 있으므로,
//! 읽기 핸들이 그런 동작을 막지 않아야 합니다. Windows에서는 공유 모드를
//! 명시해야 하고, Unix에서는 일반 open이 이미 그 의미를 가집니다.
//!
//! 파일 identity는 경로가 아니라 [`FileId`]로 추적합니다. 로테이터가
//! live 파일명을 재사용하기 때문에 경로 비교로는 재생성을 감지할 수 없습니다.

use std::io;
use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// 경로와 무관하게 파일을 식별하는 값
///
/// rename 후에도 유지되고, 같은 경로에 파일이 다시 만들어지면 달라집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    /// Windows에는 안정적인 파일 인덱스를 std가 노출하지 않으므로
    /// 생성 시각(나노초)으로 재생성을 감지합니다.
    #[cfg(windows)]
    created_nanos: u128,
}

/// 경로의 현재 파일 identity를 반환합니다.
pub async fn file_id(path: &Path) -> io::Result<FileId> {
    let meta = tokio::fs::metadata(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(FileId {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
    #[cfg(windows)]
    {
        let created = meta
            .created()?
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| io::Error::other(e))?;
        Ok(FileId {
            created_nanos: created.as_nanos(),
        })
    }
}

/// 외부 프로세스의 rename/delete/append를 허용하는 읽기 전용 open
pub fn open_shared(path: &Path) -> io::Result<std::fs::File> {
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        const FILE_SHARE_READ: u32 = 0x0000_0001;
        const FILE_SHARE_WRITE: u32 = 0x0000_0002;
        const FILE_SHARE_DELETE: u32 = 0x0000_0004;
        std::fs::OpenOptions::new()
            .read(true)
            .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
            .open(path)
    }
    #[cfg(not(windows))]
    {
        std::fs::File::open(path)
    }
}

/// 파일의 현재 크기 (바이트)
pub async fn file_len(path: &Path) -> io::Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}

/// `offset`부터 최대 `max`바이트를 읽습니다.
///
/// 반환값의 bool은 버퍼가 가득 찼는지 여부입니다. 가득 찬 경우 마지막 줄이
/// 잘렸을 수 있으며, 남은 바이트는 다음 tick에서 이어서 읽습니다.
pub async fn read_span(path: &Path, offset: u64, max: usize) -> io::Result<(Vec<u8>, bool)> {
    let std_file = open_shared(path)?;
    let mut file = tokio::fs::File::from_std(std_file);
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = vec![0u8; max];
    let mut filled = 0;
    loop {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == max {
            break;
        }
    }
    buf.truncate(filled);
    let full = filled == max;
    Ok((buf, full))
}
