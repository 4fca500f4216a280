//! CLI 모듈
//!
//! relic-rag CLI 명령어 정의 및 구현.
//! 라이브러리 파이프라인을 감싸는 얇은 데모 셸이며, HTTP 서비스 레이어는
//! 범위 밖입니다.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use uuid::Uuid;

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::PipelineConfig;
use crate::embedding::{has_api_key, EmbeddingProvider, HttpEmbedding};
use crate::error::PipelineError;
use crate::knowledge::{ChunkConfig, CjkChunker, Chunker};
use crate::pipeline::Pipeline;
use crate::store::{get_data_dir, ChunkEntry, GraphStore, LanceVectorStore, Neo4jHttpStore, VectorStore};
use crate::synthesis::{AnswerChunk, Provenance};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "relic-rag")]
#[command(version, about = "박물관 문물 지식그래프 + 벡터 RAG 질의응답", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 단일 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// 그래프 경로 비활성화
        #[arg(long)]
        no_graph: bool,

        /// 벡터 경로 비활성화
        #[arg(long)]
        no_vector: bool,

        /// LLM 쿼리 생성 경로 사용
        #[arg(long)]
        llm: bool,
    },

    /// 대화형 질의응답 세션
    Chat {
        /// 대화 기억 용량 (질문-답변 쌍)
        #[arg(short, long)]
        memory: Option<usize>,
    },

    /// 텍스트 파일을 벡터 인덱스에 추가
    Ingest {
        /// 수집할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ask {
            question,
            no_graph,
            no_vector,
            llm,
        } => cmd_ask(&question, no_graph, no_vector, llm).await,
        Commands::Chat { memory } => cmd_chat(memory).await,
        Commands::Ingest { file, dir, text } => cmd_ingest(file, dir, text).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(question: &str, no_graph: bool, no_vector: bool, llm: bool) -> Result<()> {
    let mut config = PipelineConfig::from_env();
    if no_graph {
        config.use_graph = false;
    }
    if no_vector {
        config.use_vector = false;
    }
    if llm {
        config.use_llm_translator = true;
    }

    let pipeline = Pipeline::with_config(config)
        .await
        .context("파이프라인 초기화 실패")?;
    let memory = pipeline.new_memory();

    println!("[*] 질문: {}", question);
    println!();

    let (_, provenance) = stream_answer_to_stdout(&pipeline, question, &memory).await?;
    print_provenance(provenance);

    Ok(())
}

/// 대화 명령어 (chat)
async fn cmd_chat(memory_capacity: Option<usize>) -> Result<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(k) = memory_capacity {
        config.memory_capacity = k;
    }

    let pipeline = Pipeline::with_config(config)
        .await
        .context("파이프라인 초기화 실패")?;
    let mut memory = pipeline.new_memory();
    let session_id = Uuid::new_v4();

    println!("[*] 대화 세션 시작 (id: {})", session_id);
    println!("    'exit' 입력 시 종료, 'clear' 입력 시 기억 초기화");
    println!();

    loop {
        print!("질문> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "退出" {
            break;
        }
        if question == "clear" {
            memory.clear();
            println!("[OK] 대화 기억 초기화됨");
            continue;
        }

        match stream_answer_to_stdout(&pipeline, question, &memory).await {
            Ok((answer, provenance)) => {
                print_provenance(provenance);
                memory.push(question, answer);
            }
            Err(e) => {
                if e.downcast_ref::<PipelineError>()
                    .map(|pe| matches!(pe, PipelineError::TranslationFailure))
                    .unwrap_or(false)
                {
                    println!("[!] 질문을 해석할 수 없습니다. 키워드를 포함해 다시 질문해 주세요.");
                } else {
                    println!("[!] 답변 생성 실패: {}", e);
                }
            }
        }
        println!();
    }

    println!("[OK] 세션 종료");
    Ok(())
}

/// 답변 스트림을 표준 출력으로 전달하고 (전체 텍스트, 출처)를 반환
async fn stream_answer_to_stdout(
    pipeline: &Pipeline,
    question: &str,
    memory: &crate::synthesis::ConversationMemory,
) -> Result<(String, Provenance)> {
    let mut stream = pipeline.answer(question, memory).await?;

    let mut answer = String::new();
    let mut provenance = Provenance::ModelOnly;

    while let Some(chunk) = stream.next().await {
        match chunk {
            AnswerChunk::Delta(text) => {
                print!("{}", text);
                std::io::stdout().flush()?;
                answer.push_str(&text);
            }
            AnswerChunk::Done(meta) => {
                provenance = meta.provenance;
                if meta.offline_fallback {
                    tracing::info!("answer produced by offline fallback");
                }
            }
        }
    }
    println!();

    Ok((answer, provenance))
}

fn print_provenance(provenance: Provenance) {
    match provenance {
        Provenance::EvidenceGrounded => println!("\n[OK] 출처: 검색된 증거 기반"),
        Provenance::ModelOnly => println!("\n[OK] 출처: 모델 자체 지식"),
    }
}

/// 인제스트 명령어 (ingest)
///
/// 텍스트 파일을 청킹/임베딩하여 벡터 인덱스에 저장합니다.
async fn cmd_ingest(
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    text: Option<String>,
) -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export ONEAPI_API_KEY=your-key"
        );
    }

    let embedder = HttpEmbedding::from_env().context("임베더 초기화 실패")?;
    let lance_path = get_data_dir().join("vectors.lance");
    let store = LanceVectorStore::open(&lance_path)
        .await
        .context("벡터 저장소 열기 실패")?;
    let chunker = CjkChunker::new(ChunkConfig::for_rag());

    // 수집 대상 결정
    let sources: Vec<(String, String)> = if let Some(text_content) = text {
        vec![("direct-input".to_string(), text_content)]
    } else {
        let collector = FileCollector::new(CollectorConfig::default());
        let files = if let Some(ref file_path) = file {
            match collector.collect_file(file_path)? {
                Some(f) => vec![f],
                None => {
                    println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                    return Ok(());
                }
            }
        } else if let Some(ref dir_path) = dir {
            collector.collect_directory(dir_path)?
        } else {
            bail!("--file, --dir, --text 중 하나를 지정해야 합니다");
        };

        let mut sources = Vec::with_capacity(files.len());
        for f in &files {
            let content = std::fs::read_to_string(&f.path)
                .with_context(|| format!("파일 읽기 실패: {:?}", f.path))?;
            sources.push((f.path.display().to_string(), content));
        }
        sources
    };

    if sources.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    println!("[*] 수집 대상: {} 건", sources.len());

    let mut total_chunks = 0usize;
    let mut error_count = 0usize;

    for (i, (source_id, content)) in sources.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, sources.len(), source_id);

        let chunks = chunker.chunk(content);
        if chunks.is_empty() {
            println!("건너뜀 (빈 문서)");
            continue;
        }

        let embeddings = match embedder.embed_batch(&chunks).await {
            Ok(e) => e,
            Err(e) => {
                println!("임베딩 실패: {}", e);
                error_count += 1;
                continue;
            }
        };

        let entries: Vec<ChunkEntry> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(idx, (chunk, embedding))| ChunkEntry {
                source_id: source_id.clone(),
                chunk_index: idx as i32,
                content: chunk.clone(),
                embedding,
            })
            .collect();

        match store.insert_batch(&entries).await {
            Ok(n) => {
                total_chunks += n;
                println!("완료 ({} 청크)", n);
            }
            Err(e) => {
                println!("저장 실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] 완료: {} 청크 저장, 실패 {}", total_chunks, error_count);

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("relic-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = PipelineConfig::from_env();

    // 데이터 디렉토리
    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    // API 키 상태
    if has_api_key() {
        println!("[OK] 임베딩 API 키: 설정됨");
    } else {
        println!("[!] 임베딩 API 키: 미설정");
        println!("    설정: export ONEAPI_API_KEY=your-key");
    }

    // 프로바이더 체인
    if config.providers.is_empty() {
        println!("[!] 생성 프로바이더: 미설정 (질의응답 불가)");
    } else {
        let ids: Vec<&str> = config.providers.iter().map(|p| p.id.as_str()).collect();
        println!("[OK] 생성 프로바이더 체인: {}", ids.join(" -> "));
    }

    // 벡터 인덱스
    let lance_path = data_dir.join("vectors.lance");
    match LanceVectorStore::open(&lance_path).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
            Err(e) => println!("[!] 벡터 인덱스 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 벡터 저장소 열기 실패: {}", e),
    }

    // 그래프 저장소
    match Neo4jHttpStore::from_env() {
        Ok(store) => {
            let store = store.with_timeouts(30, config.ping_timeout_secs);
            match store.ping().await {
                Ok(()) => println!("[OK] 그래프 저장소: 연결됨"),
                Err(e) => println!("[!] 그래프 저장소: 연결 실패 ({})", e),
            }
        }
        Err(e) => {
            println!("[!] 그래프 저장소: 미설정 ({})", e);
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_parses_flags() {
        let cli = Cli::parse_from(["relic-rag", "ask", "青铜鼎是什么", "--no-vector"]);
        match cli.command {
            Commands::Ask {
                question,
                no_vector,
                no_graph,
                ..
            } => {
                assert_eq!(question, "青铜鼎是什么");
                assert!(no_vector);
                assert!(!no_graph);
            }
            _ => panic!("expected ask command"),
        }
    }
}
