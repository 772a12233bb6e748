//! 전송 위치(sent position) 영속화
//!
//! 대상 파일별로 "어디까지 전송했는지"를 바이트 오프셋으로 기록합니다.
//! 위치 파일은 전송 성공 직후에만 갱신되므로, 프로세스가 죽어도
//! 중복 전송은 생겨도 유실은 생기지 않습니다.
//!
//! 위치 파일명은 대상 파일의 절대 경로를 escape한 이름이며,
//! 서로 다른 대상이 같은 위치 파일을 공유하지 않습니다.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::TailError;
use crate::fs;

/// 소스 시작 시 전송 위치를 어디에 둘지 결정하는 규칙
#[derive(Debug, Clone, Copy)]
pub struct StartPolicy {
    /// 저장된 위치와 파일 끝 사이의 허용 최대 바이트.
    /// 이보다 크면 backlog를 버리고 파일 끝에서 시작합니다.
    pub max_between_data: u64,
    /// 0이 아니면 파일 끝에서 이 줄 수만큼 앞에서 시작합니다.
    pub lines_on_start: usize,
    /// 줄 스캔에 쓰는 청크 크기
    pub max_read_buffer: usize,
}

/// 대상 파일별 전송 위치 저장소
///
/// 디스크의 위치 파일을 단일 진실로 삼고, 같은 프로세스 안의 반복 조회는
/// 메모리 캐시로 처리합니다.
pub struct PositionStore {
    dir: PathBuf,
    cache: HashMap<PathBuf, u64>,
}

impl PositionStore {
    /// `dir` 아래에 위치 파일을 보관하는 저장소를 만듭니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PositionStore {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    /// 위치 디렉터리를 생성합니다 (이미 있으면 성공).
    pub async fn ensure_dir(&self) -> Result<(), TailError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// 대상 파일의 위치 파일 경로
    pub fn pos_path(&self, target: &Path) -> PathBuf {
        self.dir.join(escape_path(target))
    }

    /// 대상 파일의 저장된 전송 위치를 반환합니다.
    ///
    /// 위치 파일이 없으면 0을 기록하고 0을 반환합니다. 내용이 숫자가
    /// 아니면 손상으로 간주하고 경고 후 0으로 되돌립니다.
    pub async fn get(&mut self, target: &Path) -> Result<u64, TailError> {
        if let Some(&pos) = self.cache.get(target) {
            return Ok(pos);
        }

        let path = self.pos_path(target);
        let pos = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match content.trim().parse::<u64>() {
                Ok(pos) => pos,
                Err(_) => {
                    warn!(
                        pos_file = %path.display(),
                        content = content.trim(),
                        "position file corrupted, resetting to 0"
                    );
                    0
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        self.save(target, pos).await?;
        Ok(pos)
    }

    /// 대상 파일의 전송 위치를 기록합니다.
    ///
    /// 파일 전체를 덮어쓰며, 호출이 성공한 경우에만 캐시를 갱신합니다.
    pub async fn save(&mut self, target: &Path, pos: u64) -> Result<(), TailError> {
        let path = self.pos_path(target);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(format!("{pos}\n").as_bytes()).await?;
        file.flush().await?;
        self.cache.insert(target.to_path_buf(), pos);
        Ok(())
    }

    /// 소스 시작 시점의 전송 위치를 결정하고 기록합니다.
    ///
    /// 저장된 위치가 파일 크기보다 크면 (truncate/재생성) 파일 끝으로
    /// 잘라내고, backlog가 `max_between_data`를 넘으면 버립니다.
    /// `lines_on_start`가 설정되면 파일 끝에서 해당 줄 수 앞에서 시작합니다.
    pub async fn start(
        &mut self,
        target: &Path,
        policy: &StartPolicy,
    ) -> Result<u64, TailError> {
        let file_pos = fs::file_len(target).await?;
        let mut spos = self.get(target).await?;

        if spos > file_pos {
            warn!(
                target = %target.display(),
                saved = spos,
                file = file_pos,
                "saved position exceeds file size, clamping"
            );
            spos = file_pos;
        }

        if file_pos - spos > policy.max_between_data {
            warn!(
                target = %target.display(),
                backlog = file_pos - spos,
                limit = policy.max_between_data,
                "backlog exceeds max_between_data, skipping to end of file"
            );
            spos = file_pos;
        }

        if policy.lines_on_start > 0 {
            spos = offset_before_last_lines(
                target,
                policy.lines_on_start,
                policy.max_read_buffer,
            )
            .await?;
            debug!(
                target = %target.display(),
                lines = policy.lines_on_start,
                start = spos,
                "starting before last lines"
            );
        }

        self.save(target, spos).await?;
        Ok(spos)
    }
}

/// 대상 경로를 위치 파일 이름으로 escape합니다.
///
/// 경로 구분자는 `_`로 바꾸고 드라이브 콜론은 제거합니다.
fn escape_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('_'),
            ':' => None,
            other => Some(other),
        })
        .collect()
}

/// 파일 끝에서 마지막 `n`줄 앞의 바이트 오프셋을 반환합니다.
///
/// 파일을 앞에서부터 청크 단위로 스캔하면서 최근 `n`개의 줄 시작
/// 오프셋만 유지합니다. 파일 끝 위치 자체는 줄 시작으로 치지 않습니다.
async fn offset_before_last_lines(
    path: &Path,
    n: usize,
    chunk: usize,
) -> Result<u64, TailError> {
    let mut starts: VecDeque<u64> = VecDeque::with_capacity(n + 1);
    starts.push_back(0);

    let mut offset = 0u64;
    loop {
        let (bytes, _) = fs::read_span(path, offset, chunk).await?;
        if bytes.is_empty() {
            break;
        }
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'\n' {
                if starts.len() > n {
                    starts.pop_front();
                }
                starts.push_back(offset + i as u64 + 1);
            }
        }
        offset += bytes.len() as u64;
    }

    // 파일이 개행으로 끝나면 마지막 항목은 빈 "다음 줄"의 시작이므로 버립니다.
    if starts.len() > 1 && *starts.back().unwrap_or(&0) == offset {
        starts.pop_back();
    }
    while starts.len() > n {
        starts.pop_front();
    }
    Ok(starts.front().copied().unwrap_or(0))
}
