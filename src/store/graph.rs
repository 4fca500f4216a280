//! Graph Store - Neo4j 그래프 저장소
//!
//! Neo4j HTTP 트랜잭션 Cypher 엔드포인트(`/db/{db}/tx/commit`)를 사용합니다.
//! 에러는 두 갈래로 구분됩니다:
//! - 구문/클라이언트 에러 (`Neo.ClientError.*`) -> `QuerySyntax`: 변형 단위 스킵
//! - 전송/서버 에러 -> `StoreUnavailable`: 제한된 재시도 후 경로 스킵

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

// ============================================================================
// Types & Trait
// ============================================================================

/// 그래프 쿼리 결과 행: (컬럼 이름, 값) 순서 보존
pub type GraphRecord = Vec<(String, Value)>;

/// GraphStore 트레이트 (async)
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Cypher 쿼리 실행
    async fn query(&self, cypher: &str) -> Result<Vec<GraphRecord>>;

    /// 연결 확인 (짧은 타임아웃)
    async fn ping(&self) -> Result<()>;
}

// ============================================================================
// Neo4jHttpStore
// ============================================================================

/// Neo4j HTTP API 그래프 저장소
///
/// reqwest 클라이언트가 연결 풀을 내부에서 관리하므로 질문 간에 핸들을
/// 그대로 공유할 수 있습니다.
pub struct Neo4jHttpStore {
    client: reqwest::Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
    query_timeout: Duration,
    ping_timeout: Duration,
}

impl Neo4jHttpStore {
    /// 새 저장소 핸들 생성
    ///
    /// # Arguments
    /// * `base_url` - Neo4j HTTP 주소 (예: http://localhost:7474)
    /// * `database` - 데이터베이스 이름 (보통 "neo4j")
    /// * `user` / `password` - 인증 정보
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            query_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
        }
    }

    /// 환경변수에서 생성 (`NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`, `NEO4J_DATABASE`)
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var("NEO4J_URI")
            .unwrap_or_else(|_| "http://localhost:7474".to_string());
        let user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());
        let password = std::env::var("NEO4J_PASSWORD").map_err(|_| {
            PipelineError::Config("NEO4J_PASSWORD environment variable not set".to_string())
        })?;
        let database = std::env::var("NEO4J_DATABASE").unwrap_or_else(|_| "neo4j".to_string());

        Ok(Self::new(uri, database, user, password))
    }

    /// 쿼리 타임아웃 설정
    pub fn with_timeouts(mut self, query_secs: u64, ping_secs: u64) -> Self {
        self.query_timeout = Duration::from_secs(query_secs);
        self.ping_timeout = Duration::from_secs(ping_secs);
        self
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    async fn execute(&self, cypher: &str, timeout: Duration) -> Result<Vec<GraphRecord>> {
        let request = TxRequest {
            statements: vec![Statement { statement: cypher }],
        };

        let response = self
            .client
            .post(self.commit_url())
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("graph request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::StoreUnavailable(format!(
                "graph API error ({}): {}",
                status, body
            )));
        }

        let parsed: TxResponse = response.json().await.map_err(|e| {
            PipelineError::StoreUnavailable(format!("malformed graph response: {}", e))
        })?;

        // Neo4j는 에러를 200 응답의 errors 배열로 보고한다
        if let Some(err) = parsed.errors.first() {
            if err.code.contains("ClientError") {
                return Err(PipelineError::QuerySyntax(format!(
                    "{}: {}",
                    err.code, err.message
                )));
            }
            return Err(PipelineError::StoreUnavailable(format!(
                "{}: {}",
                err.code, err.message
            )));
        }

        Ok(records_from_response(parsed))
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn query(&self, cypher: &str) -> Result<Vec<GraphRecord>> {
        self.execute(cypher, self.query_timeout).await
    }

    async fn ping(&self) -> Result<()> {
        self.execute("RETURN 1", self.ping_timeout).await.map(|_| ())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Debug, Serialize)]
struct Statement<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    columns: Vec<String>,
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// 응답을 (컬럼, 값) 순서 보존 레코드로 변환
fn records_from_response(response: TxResponse) -> Vec<GraphRecord> {
    let mut records = Vec::new();
    for result in response.results {
        for data in result.data {
            let record: GraphRecord = result
                .columns
                .iter()
                .cloned()
                .zip(data.row.into_iter())
                .collect();
            records.push(record);
        }
    }
    records
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_from_response() {
        let body = r#"{
            "results": [{
                "columns": ["relic_name", "museum_name"],
                "data": [
                    {"row": ["镂空模纹壶", "大英博物馆"]},
                    {"row": ["青铜鼎", "故宫博物院"]}
                ]
            }],
            "errors": []
        }"#;
        let parsed: TxResponse = serde_json::from_str(body).unwrap();
        let records = records_from_response(parsed);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0][0].0, "relic_name");
        assert_eq!(records[0][0].1, Value::String("镂空模纹壶".to_string()));
        assert_eq!(records[1][1].1, Value::String("故宫博物院".to_string()));
    }

    #[test]
    fn test_client_error_parse() {
        let body = r#"{
            "results": [],
            "errors": [{
                "code": "Neo.ClientError.Statement.SyntaxError",
                "message": "Invalid input"
            }]
        }"#;
        let parsed: TxResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.errors[0].code, "Neo.ClientError.Statement.SyntaxError");
        assert!(parsed.errors[0].code.contains("ClientError"));
    }

    #[test]
    fn test_commit_url() {
        let store = Neo4jHttpStore::new("http://localhost:7474/", "neo4j", "u", "p");
        assert_eq!(store.commit_url(), "http://localhost:7474/db/neo4j/tx/commit");
    }

    #[test]
    fn test_null_values_preserved() {
        let body = r#"{
            "results": [{
                "columns": ["relic_name", "material"],
                "data": [{"row": ["青铜鼎", null]}]
            }],
            "errors": []
        }"#;
        let parsed: TxResponse = serde_json::from_str(body).unwrap();
        let records = records_from_response(parsed);
        assert_eq!(records[0][1].1, Value::Null);
    }
}
