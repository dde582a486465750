//! CLI 모듈
//!
//! neuro-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chain::RagChain;
use crate::config::{has_api_key, Settings};
use crate::conversation::{process_turn, resolve_suggestion, Conversation, Role, SUGGESTIONS};
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::ingest::run_ingestion;
use crate::knowledge::{IndexManifest, LanceVectorStore, SearchResult, VectorStore};
use crate::resources::build_chain;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "neuro-rag")]
#[command(version, about = "신경발달장애 문서 기반 RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 벡터 인덱스 디렉토리 (NEURORAG_INDEX_DIR 대신 사용)
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 원본 문서 폴더로 벡터 인덱스 생성 (기존 인덱스 교체)
    Ingest {
        /// 원본 문서 폴더 (NEURORAG_DATA_DIR 대신 사용)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short, long)]
        k: Option<usize>,

        /// 검색된 근거 청크 출력
        #[arg(long)]
        show_sources: bool,
    },

    /// 대화형 채팅
    Chat {
        /// 검색할 청크 수
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 예시 질문 목록
    Suggestions,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env().map_err(RagError::from)?;
    if let Some(index_dir) = cli.index_dir {
        settings.index_dir = index_dir;
    }

    match cli.command {
        Commands::Ingest { dir } => {
            if let Some(dir) = dir {
                settings.data_dir = dir;
            }
            cmd_ingest(&settings).await
        }
        Commands::Ask {
            question,
            k,
            show_sources,
        } => {
            apply_k(&mut settings, k)?;
            cmd_ask(&settings, &question, show_sources).await
        }
        Commands::Chat { k } => {
            apply_k(&mut settings, k)?;
            cmd_chat(&settings).await
        }
        Commands::Suggestions => {
            cmd_suggestions();
            Ok(())
        }
        Commands::Status => cmd_status(&settings).await,
    }
}

fn apply_k(settings: &mut Settings, k: Option<usize>) -> Result<()> {
    if let Some(k) = k {
        settings.retrieval_k = k;
        settings.validate().map_err(RagError::from)?;
    }
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 생성
async fn cmd_ingest(settings: &Settings) -> Result<()> {
    println!("[*] 원본 폴더: {}", settings.data_dir.display());
    println!("[*] 인덱스 위치: {}", settings.index_dir.display());
    println!("[*] 임베딩 모델 로드 중: {}", settings.embedding_model);

    let embedder = create_embedder(settings).await.map_err(RagError::from)?;

    println!("[*] 문서 로드, 청킹, 임베딩 중...");
    let report = run_ingestion(settings, embedder)
        .await
        .map_err(RagError::from)?;

    println!();
    println!("[OK] 인덱스 생성 완료 ({:.1}초)", report.elapsed.as_secs_f64());
    println!("     문서: {} 건", report.document_count);
    println!("     청크: {} 개", report.chunk_count);
    println!("     저장된 레코드: {} 개", report.record_count);
    println!("     임베딩 모델: {}", report.embedding_model);
    println!("     위치: {}", report.index_dir.display());

    Ok(())
}

/// 단일 질문
async fn cmd_ask(settings: &Settings, question: &str, show_sources: bool) -> Result<()> {
    let chain = build_chain(settings).await.map_err(RagError::from)?;
    ask(&chain, question, show_sources, &mut std::io::stdout()).await
}

/// 질문에 답하고 출력
///
/// 실패하면 아무것도 출력하지 않고 에러를 반환합니다. 에러 출력은 `main` 이 맡습니다.
async fn ask<W: Write>(
    chain: &RagChain,
    question: &str,
    show_sources: bool,
    out: &mut W,
) -> Result<()> {
    let response = chain.respond(question).await.map_err(RagError::from)?;

    writeln!(out, "{}", response.answer)?;

    if show_sources {
        writeln!(out)?;
        if response.passages.is_empty() {
            writeln!(out, "[!] 검색된 근거가 없습니다.")?;
        } else {
            writeln!(out, "[OK] 근거 청크 ({} 건):", response.passages.len())?;
            write_passages(out, &response.passages)?;
        }
    }

    Ok(())
}

fn write_passages<W: Write>(out: &mut W, passages: &[SearchResult]) -> std::io::Result<()> {
    for (i, passage) in passages.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "{}. [{:.3}] {}", i + 1, passage.score, passage.citation())?;
        writeln!(out, "   {}", truncate_text(&passage.text, 200))?;
    }
    Ok(())
}

/// 대화형 채팅
async fn cmd_chat(settings: &Settings) -> Result<()> {
    let chain = build_chain(settings).await.map_err(RagError::from)?;

    println!("NeuroRAG - Neurodevelopmental Disorders Chatbot");
    println!("질문을 입력하세요. 숫자(1-{})는 예시 질문, /suggestions 목록, /history 기록, /quit 종료", SUGGESTIONS.len());
    println!();

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                print_history(&conversation);
                continue;
            }
            "/suggestions" => {
                cmd_suggestions();
                continue;
            }
            _ => {}
        }

        let question = resolve_suggestion(input).to_string();
        if question != input {
            println!("[*] {}", question);
        }

        conversation = process_turn(conversation, &chain, &question).await;
        if let Some(turn) = conversation.last() {
            println!("{}", turn.content);
            println!();
        }
    }

    println!("[OK] 대화 종료 ({} 턴)", conversation.len());
    Ok(())
}

fn print_history(conversation: &Conversation) {
    if conversation.is_empty() {
        println!("[!] 대화 기록이 없습니다.");
        return;
    }

    for turn in conversation.turns() {
        let label = match turn.role {
            Role::User => "You",
            Role::Assistant => "NeuroRAG",
        };
        println!("{}: {}", label, truncate_text(&turn.content, 120));
    }
    println!();
}

/// 예시 질문 출력
fn cmd_suggestions() {
    println!("[*] 예시 질문:");
    for (i, question) in SUGGESTIONS.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, question);
    }
}

/// 상태 확인 (실패하지 않음)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("neuro-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 원본 폴더: {}", settings.data_dir.display());
    println!("[*] 임베딩 모델: {} (device: {:?})", settings.embedding_model, settings.device);
    println!(
        "[*] 생성 모델: {} (temperature {}, top-{})",
        settings.llm_model, settings.temperature, settings.retrieval_k
    );
    println!(
        "[*] 청킹: {}자 / 오버랩 {}자",
        settings.chunk_size, settings.chunk_overlap
    );

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GOOGLE_API_KEY=your-key (또는 .env 파일)");
    }

    let index_dir = &settings.index_dir;
    if !index_dir.is_dir() {
        println!("[!] 벡터 인덱스 없음: {}", index_dir.display());
        println!("    생성: neuro-rag ingest");
        return Ok(());
    }

    println!(
        "[*] 벡터 인덱스: {} ({})",
        index_dir.display(),
        format_bytes(dir_size(index_dir))
    );

    match LanceVectorStore::open(index_dir).await {
        Ok(Some(store)) => match store.count().await {
            Ok(count) => println!("[OK] 저장된 청크: {} 개 ({}차원)", count, store.dimension()),
            Err(e) => println!("[!] 청크 수 조회 실패: {:#}", e),
        },
        Ok(None) => println!("[!] 인덱스가 비어 있습니다"),
        Err(e) => println!("[!] 인덱스 열기 실패: {:#}", e),
    }

    match IndexManifest::read(index_dir).await {
        Ok(Some(manifest)) => {
            println!(
                "[OK] 마지막 수집: {} (run {})",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                manifest.run_id
            );
            println!(
                "     모델 {} / 문서 {} 건 / 청크 {} 개",
                manifest.embedding_model, manifest.document_count, manifest.chunk_count
            );
            if let Err(reason) = manifest
                .check_compatible(&settings.embedding_model, manifest.dimension)
            {
                println!("[!] 현재 설정과 호환되지 않음: {}", reason);
            }
        }
        Ok(None) => println!("[!] 매니페스트 없음"),
        Err(e) => println!("[!] 매니페스트 읽기 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (줄바꿈 제거)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// 디렉토리 전체 크기 (읽을 수 없는 항목은 무시)
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

// ============================================================================
// Tests
// ============================================================================
