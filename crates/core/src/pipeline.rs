//! 파이프라인 trait — tailing 구현의 공유 확장 포인트
//!
//! 파일 tailing과 (범위 외의) 테이블 tailing이 같은 생명주기로 관리되도록
//! 공통 trait을 정의합니다. 상속 계층 대신 trait + 조합으로 표현합니다.

use crate::error::TailpostError;
use crate::types::TickReport;

/// tailing 구현이 공유하는 trait
///
/// 구현체는 한 소스를 소유하며, 워커 루프가 주기적으로 [`tick`](Tailer::tick)을
/// 호출합니다. 위치 타입은 구현마다 다릅니다 (파일: 바이트 오프셋,
/// 테이블: 키 값).
pub trait Tailer: Send {
    /// 전송 위치 타입
    type Position;

    /// 한 주기를 실행합니다: 로테이션 확인, 새 데이터 읽기, 전송, 위치 갱신.
    fn tick(
        &mut self,
    ) -> impl Future<Output = Result<TickReport, TailpostError>> + Send;

    /// 현재 활성 대상이 있는지 여부
    fn has_target(&self) -> bool;

    /// 현재 대상의 전송 위치를 반환합니다.
    fn sent_position(
        &mut self,
    ) -> impl Future<Output = Result<Self::Position, TailpostError>> + Send;

    /// 현재 대상의 전송 위치를 저장합니다.
    fn save_position(
        &mut self,
        pos: Self::Position,
    ) -> impl Future<Output = Result<(), TailpostError>> + Send;
}
