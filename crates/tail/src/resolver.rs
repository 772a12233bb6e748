//! 대상 파일 탐색과 로테이션 추적
//!
//! 소스 하나는 디렉토리 하나에서 glob 패턴에 맞는 파일 집합을 감시하고,
//! 그중 "가장 최근" 파일 하나만 tail합니다. live 파일(`latest`)이
//! 설정되면 로테이터가 그 파일을 rename/재생성하는 순간을 [`FileId`]
//! 변화로 감지하여 전송 위치를 frozen 파일로 옮깁니다.

use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::error::{DslError, TailError};
use crate::fs::{self, FileId};
use crate::position::{PositionStore, StartPolicy};
use tailpost_core::config::SourceConfig;

/// 현재 tail 중인 대상 파일과 그 identity
#[derive(Debug, Clone)]
pub struct TargetFile {
    /// 대상 경로
    pub path: PathBuf,
    /// open 시점의 파일 identity (재생성 감지용)
    pub id: FileId,
}

/// 소스 하나의 대상 파일 상태 기계
#[derive(Debug)]
pub struct TargetResolver {
    tag: String,
    dir: PathBuf,
    pattern: String,
    latest: Option<PathBuf>,
    order_pattern: Option<Regex>,
    reverse_order: bool,
    latest_id: Option<FileId>,
    target: Option<TargetFile>,
}

impl TargetResolver {
    /// 소스 설정으로부터 resolver를 만듭니다.
    ///
    /// `order_pattern`은 이 시점에 컴파일하며 `date`/`order` 명명
    /// 캡처가 없으면 거부합니다.
    pub fn new(cfg: &SourceConfig) -> Result<Self, TailError> {
        let order_pattern = match &cfg.order_pattern {
            Some(raw) => {
                let rx = Regex::new(raw).map_err(|e| DslError::InvalidRegex {
                    name: raw.clone(),
                    source: e,
                })?;
                let names: Vec<_> = rx.capture_names().flatten().collect();
                if !names.contains(&"date") || !names.contains(&"order") {
                    return Err(DslError::OrderCaptures.into());
                }
                Some(rx)
            }
            None => None,
        };

        let dir = PathBuf::from(&cfg.dir);
        Ok(TargetResolver {
            tag: cfg.tag.clone(),
            latest: cfg.latest.as_ref().map(|name| dir.join(name)),
            dir,
            pattern: cfg.pattern.clone(),
            order_pattern,
            reverse_order: cfg.reverse_order,
            latest_id: None,
            target: None,
        })
    }

    /// live 파일이 설정되어 있는지 여부
    pub fn has_latest(&self) -> bool {
        self.latest.is_some()
    }

    /// 현재 대상 파일
    pub fn target(&self) -> Option<&TargetFile> {
        self.target.as_ref()
    }

    /// 대상 파일을 잊습니다 (다음 재탐색 주기에 다시 선택).
    pub fn clear_target(&mut self) {
        self.target = None;
    }

    /// glob에 맞는 후보 파일을 오래된 것부터 정렬해 반환합니다.
    ///
    /// live 파일은 제외합니다. `order_pattern`이 있으면
    /// `{date}.{order:06}` 키로 정렬하고, 패턴에 맞지 않는 파일은
    /// 경고 후 건너뜁니다. 패턴이 없으면 파일명 사전순입니다.
    pub fn sorted_candidates(&self) -> Result<Vec<PathBuf>, TailError> {
        let glob_expr = self.dir.join(&self.pattern);
        let entries = glob::glob(&glob_expr.to_string_lossy()).map_err(|e| {
            TailError::Config {
                field: "pattern".to_owned(),
                reason: e.to_string(),
            }
        })?;

        let mut keyed: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(tag = %self.tag, error = %e, "skipping unreadable glob entry");
                    continue;
                }
            };
            if Some(&path) == self.latest.as_ref() {
                continue;
            }
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            let key = match &self.order_pattern {
                Some(rx) => match order_key(rx, &name) {
                    Some(key) => key,
                    None => {
                        warn!(
                            tag = %self.tag,
                            file = name.as_str(),
                            "file does not match order pattern, skipping"
                        );
                        continue;
                    }
                },
                None => name,
            };
            keyed.push((key, path));
        }

        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        if self.reverse_order {
            keyed.reverse();
        }
        Ok(keyed.into_iter().map(|(_, path)| path).collect())
    }

    /// live 파일의 로테이션 여부를 확인하고 처리합니다.
    ///
    /// live 파일의 identity가 바뀌었다면 로테이터가 방금 rename 후
    /// 재생성한 것입니다. live 위치를 직전까지 쓰이던 frozen 파일
    /// (가장 최근 후보)로 옮기고, live 위치를 0으로 되돌린 뒤 frozen
    /// 파일을 대상으로 삼아 남은 꼬리를 마저 전송하게 합니다.
    pub async fn handle_latest_rotation(
        &mut self,
        positions: &mut PositionStore,
    ) -> Result<bool, TailError> {
        let Some(latest) = self.latest.clone() else {
            return Ok(false);
        };

        let current_id = match fs::file_id(&latest).await {
            Ok(id) => Some(id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match (self.latest_id, current_id) {
            (None, Some(id)) => {
                self.latest_id = Some(id);
                Ok(false)
            }
            (Some(prev), Some(id)) if prev != id => {
                self.latest_id = Some(id);
                self.rotate_to_frozen(&latest, positions).await?;
                Ok(true)
            }
            (Some(_), None) => {
                // rename은 일어났지만 새 live 파일이 아직 없는 틈새.
                // 재생성을 기다리지 않고 로테이션으로 처리해야 새 파일이
                // 생겼을 때 0부터 읽는다.
                warn!(
                    tag = %self.tag,
                    latest = %latest.display(),
                    "live file rotated away, new live file not yet created"
                );
                self.latest_id = None;
                self.rotate_to_frozen(&latest, positions).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// live 위치를 가장 최근 frozen 후보로 옮기고 live 기록을 0으로
    /// 되돌린 뒤 frozen 파일을 대상으로 삼습니다.
    async fn rotate_to_frozen(
        &mut self,
        latest: &Path,
        positions: &mut PositionStore,
    ) -> Result<(), TailError> {
        let live_pos = positions.get(latest).await?;
        let candidates = self.sorted_candidates()?;
        match candidates.last() {
            Some(frozen) => {
                positions.save(frozen, live_pos).await?;
                positions.save(latest, 0).await?;
                let fid = fs::file_id(frozen).await?;
                info!(
                    tag = %self.tag,
                    frozen = %frozen.display(),
                    pos = live_pos,
                    "live file rotated, draining frozen tail"
                );
                self.target = Some(TargetFile {
                    path: frozen.clone(),
                    id: fid,
                });
            }
            None => {
                // 로테이터가 rename 없이 truncate했거나 frozen을 바로 지운 경우
                error!(
                    tag = %self.tag,
                    "live file rotated but no frozen candidate found"
                );
                positions.save(latest, 0).await?;
                self.target = None;
            }
        }
        Ok(())
    }

    /// 현재 대상 파일의 재생성 여부를 확인하고 처리합니다.
    ///
    /// 파일이 사라졌거나 identity가 바뀌었으면 위치를 0으로 되돌리고
    /// 대상을 비웁니다. live 파일이 없는 소스에서 쓰입니다.
    pub async fn handle_recreate(
        &mut self,
        positions: &mut PositionStore,
    ) -> Result<bool, TailError> {
        let Some(target) = self.target.clone() else {
            return Ok(false);
        };

        let recreated = match fs::file_id(&target.path).await {
            Ok(id) => id != target.id,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if recreated {
            warn!(
                tag = %self.tag,
                target = %target.path.display(),
                "target file recreated or removed, resetting position"
            );
            positions.save(&target.path, 0).await?;
            self.target = None;
        }
        Ok(recreated)
    }

    /// 가장 최근 파일을 대상으로 다시 선택합니다.
    ///
    /// live 파일이 존재하면 항상 가장 최근 후보로 취급합니다.
    /// 대상이 바뀌었을 때만 위치를 읽으며, `start`가 참이면 시작
    /// 정책(backlog 상한, lines_on_start)을 적용합니다.
    pub async fn update_target(
        &mut self,
        start: bool,
        positions: &mut PositionStore,
        policy: &StartPolicy,
    ) -> Result<(), TailError> {
        let mut candidates = self.sorted_candidates()?;
        if let Some(latest) = &self.latest {
            match fs::file_id(latest).await {
                Ok(id) => {
                    if self.latest_id.is_none() {
                        self.latest_id = Some(id);
                    }
                    candidates.push(latest.clone());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let Some(newest) = candidates.last() else {
            warn!(tag = %self.tag, dir = %self.dir.display(), "no target file found");
            self.target = None;
            return Ok(());
        };

        if self.target.as_ref().map(|t| &t.path) == Some(newest) {
            return Ok(());
        }

        let id = fs::file_id(newest).await?;
        let pos = if start {
            positions.start(newest, policy).await?
        } else {
            positions.get(newest).await?
        };
        debug!(tag = %self.tag, target = %newest.display(), pos, "target selected");
        self.target = Some(TargetFile {
            path: newest.clone(),
            id,
        });
        Ok(())
    }
}

/// 파일명에 order 패턴을 적용해 정렬 키를 만듭니다.
fn order_key(rx: &Regex, name: &str) -> Option<String> {
    let caps = rx.captures(name)?;
    let date = caps.name("date")?.as_str();
    let order: u64 = caps.name("order")?.as_str().parse().ok()?;
    Some(format!("{date}.{order:06}"))
}
