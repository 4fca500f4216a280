//! 프로바이더 페일오버 체인
//!
//! 설정된 순서대로 프로바이더를 시도하는 명시적 상태 기계입니다.
//! 상태 전이:
//! - `Trying(i)` --프로바이더 에러--> `Trying(i+1)` (원본 프롬프트 유지)
//! - `Trying(i)` --스트림 정상 종료--> `Succeeded`
//! - `Trying(마지막)` --에러--> `ExhaustedFallback` (오프라인 폴백 필요)
//!
//! 같은 프로바이더 재시도는 제한된 횟수까지만, 다음 프로바이더로는 항상
//! 넘어갑니다. 체인이 비어 있으면 기동 시점에 실패합니다.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use super::{ChatMessage, GenerationProvider};
use crate::error::{PipelineError, Result};

// ============================================================================
// States & Events
// ============================================================================

/// 페일오버 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    /// i번째 프로바이더 시도 중
    Trying(usize),
    /// 스트림이 종료 마커까지 전달됨
    Succeeded,
    /// 모든 프로바이더 소진
    ExhaustedFallback,
}

/// 체인 스트림 이벤트
///
/// 소비자(합성기)는 이벤트를 순서대로 소비해야 합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// 텍스트 조각
    Fragment(String),
    /// 프로바이더 교체. `restarted`가 true면 이전 프로바이더가 조각을
    /// 일부 내보낸 뒤 실패한 것이므로 누적 텍스트를 버려야 합니다.
    Switched { to: String, restarted: bool },
    /// 정상 종료. `fragments`가 0이면 프로바이더가 빈 스트림을 반환한 것.
    Done { provider: String, fragments: usize },
    /// 전체 소진: 오프라인 폴백으로 강등
    Exhausted,
}

// ============================================================================
// ProviderChain
// ============================================================================

/// 순서 있는 생성 프로바이더 체인
pub struct ProviderChain {
    providers: Vec<Arc<dyn GenerationProvider>>,
    retries_per_provider: u32,
}

impl ProviderChain {
    /// 체인 생성. 프로바이더가 하나도 없으면 즉시 실패합니다.
    pub fn new(
        providers: Vec<Arc<dyn GenerationProvider>>,
        retries_per_provider: u32,
    ) -> Result<Self> {
        if providers.is_empty() {
            return Err(PipelineError::Config(
                "at least one generation provider must be configured".to_string(),
            ));
        }
        Ok(Self {
            providers,
            retries_per_provider,
        })
    }

    /// 체인 길이
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// 프로바이더 이름 목록 (설정 순서)
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// 첫 번째 프로바이더 (LLM 쿼리 생성 경로용)
    pub fn primary(&self) -> Arc<dyn GenerationProvider> {
        Arc::clone(&self.providers[0])
    }

    /// 페일오버 스트림 실행
    ///
    /// 단방향 1회성 이벤트 스트림을 반환합니다. 조각은 도착하는 대로
    /// 전달되며 버퍼링하지 않습니다. 스트림 드롭 시 진행 중인 프로바이더
    /// 요청도 함께 취소됩니다.
    pub fn stream(
        &self,
        prompt: String,
        history: Vec<ChatMessage>,
    ) -> BoxStream<'_, ChainEvent> {
        Box::pin(async_stream::stream! {
            let mut state = ChainState::Trying(0);
            let mut emitted_since_switch = false;

            while let ChainState::Trying(index) = state {
                let Some(provider) = self.providers.get(index) else {
                    state = ChainState::ExhaustedFallback;
                    break;
                };

                let mut attempt = 0u32;
                let mut succeeded = false;

                while attempt <= self.retries_per_provider {
                    let mut fragments = 0usize;
                    let mut failure: Option<PipelineError> = None;
                    let mut inner = provider.stream(prompt.clone(), history.clone());

                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(fragment) => {
                                fragments += 1;
                                emitted_since_switch = true;
                                yield ChainEvent::Fragment(fragment);
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }

                    match failure {
                        None => {
                            yield ChainEvent::Done {
                                provider: provider.name().to_string(),
                                fragments,
                            };
                            succeeded = true;
                            break;
                        }
                        Some(e) => {
                            tracing::warn!(
                                provider = provider.name(),
                                attempt,
                                error = %e,
                                "provider stream failed"
                            );
                            attempt += 1;
                        }
                    }
                }

                if succeeded {
                    state = ChainState::Succeeded;
                    break;
                }

                // 다음 프로바이더로 전진 (원본 프롬프트 유지)
                state = ChainState::Trying(index + 1);
                if let Some(next) = self.providers.get(index + 1) {
                    yield ChainEvent::Switched {
                        to: next.name().to_string(),
                        restarted: emitted_since_switch,
                    };
                    emitted_since_switch = false;
                }
            }

            if state == ChainState::ExhaustedFallback {
                tracing::warn!("all generation providers exhausted");
                yield ChainEvent::Exhausted;
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::FragmentStream;
    use async_trait::async_trait;

    /// 테스트용 프로바이더: 준비된 결과를 재생
    struct FakeProvider {
        id: String,
        fragments: Vec<String>,
        fail_after: Option<usize>,
    }

    impl FakeProvider {
        fn ok(id: &str, fragments: &[&str]) -> Arc<dyn GenerationProvider> {
            Arc::new(Self {
                id: id.to_string(),
                fragments: fragments.iter().map(|s| s.to_string()).collect(),
                fail_after: None,
            })
        }

        fn failing(id: &str, fragments: &[&str], fail_after: usize) -> Arc<dyn GenerationProvider> {
            Arc::new(Self {
                id: id.to_string(),
                fragments: fragments.iter().map(|s| s.to_string()).collect(),
                fail_after: Some(fail_after),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeProvider {
        fn name(&self) -> &str {
            &self.id
        }

        fn stream(&self, _prompt: String, _history: Vec<ChatMessage>) -> FragmentStream<'_> {
            let fragments = self.fragments.clone();
            let fail_after = self.fail_after;
            let id = self.id.clone();
            Box::pin(async_stream::stream! {
                let mut emitted = 0usize;
                for f in fragments {
                    if fail_after == Some(emitted) {
                        yield Err(PipelineError::provider(&id, "simulated failure"));
                        return;
                    }
                    yield Ok(f);
                    emitted += 1;
                }
                if let Some(n) = fail_after {
                    if n >= emitted {
                        yield Err(PipelineError::provider(&id, "simulated failure"));
                    }
                }
            })
        }
    }

    async fn collect(chain: &ProviderChain) -> Vec<ChainEvent> {
        chain.stream("问题".to_string(), vec![]).collect().await
    }

    #[test]
    fn test_empty_chain_fails_fast() {
        let result = ProviderChain::new(vec![], 0);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_single_provider_success() {
        let chain = ProviderChain::new(vec![FakeProvider::ok("a", &["你", "好"])], 0).unwrap();
        let events = collect(&chain).await;

        assert_eq!(events[0], ChainEvent::Fragment("你".to_string()));
        assert_eq!(events[1], ChainEvent::Fragment("好".to_string()));
        assert_eq!(
            events[2],
            ChainEvent::Done {
                provider: "a".to_string(),
                fragments: 2
            }
        );
    }

    #[tokio::test]
    async fn test_failover_to_second_provider() {
        let chain = ProviderChain::new(
            vec![
                FakeProvider::failing("a", &[], 0),
                FakeProvider::ok("b", &["答案"]),
            ],
            0,
        )
        .unwrap();
        let events = collect(&chain).await;

        assert_eq!(
            events[0],
            ChainEvent::Switched {
                to: "b".to_string(),
                restarted: false
            }
        );
        assert_eq!(events[1], ChainEvent::Fragment("答案".to_string()));
        assert!(matches!(events[2], ChainEvent::Done { ref provider, .. } if provider == "b"));
    }

    #[tokio::test]
    async fn test_midstream_failure_marks_restart() {
        let chain = ProviderChain::new(
            vec![
                FakeProvider::failing("a", &["部分", "x"], 1),
                FakeProvider::ok("b", &["完整回答"]),
            ],
            0,
        )
        .unwrap();
        let events = collect(&chain).await;

        // 첫 프로바이더가 조각 하나를 내고 실패 -> restarted 플래그
        assert_eq!(events[0], ChainEvent::Fragment("部分".to_string()));
        assert_eq!(
            events[1],
            ChainEvent::Switched {
                to: "b".to_string(),
                restarted: true
            }
        );
    }

    #[tokio::test]
    async fn test_all_providers_fail_terminates() {
        // 모든 프로바이더 실패 -> 유한 단계 내 Exhausted 로 종료
        let chain = ProviderChain::new(
            vec![
                FakeProvider::failing("a", &[], 0),
                FakeProvider::failing("b", &[], 0),
                FakeProvider::failing("c", &[], 0),
            ],
            1,
        )
        .unwrap();
        let events = collect(&chain).await;

        assert_eq!(events.last(), Some(&ChainEvent::Exhausted));
        // Fragment 이벤트는 없어야 함
        assert!(!events.iter().any(|e| matches!(e, ChainEvent::Fragment(_))));
    }

    #[tokio::test]
    async fn test_empty_stream_reports_zero_fragments() {
        let chain = ProviderChain::new(vec![FakeProvider::ok("a", &[])], 0).unwrap();
        let events = collect(&chain).await;

        assert_eq!(
            events[0],
            ChainEvent::Done {
                provider: "a".to_string(),
                fragments: 0
            }
        );
    }

    #[tokio::test]
    async fn test_bounded_same_provider_retry() {
        // retries_per_provider = 1 -> 프로바이더당 최대 2회 시도 후 전진
        let chain = ProviderChain::new(
            vec![
                FakeProvider::failing("a", &[], 0),
                FakeProvider::ok("b", &["ok"]),
            ],
            1,
        )
        .unwrap();
        let events = collect(&chain).await;
        assert!(events.iter().any(|e| matches!(e, ChainEvent::Done { provider, .. } if provider == "b")));
    }
}
