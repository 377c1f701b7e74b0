//! # kvbench-app
//!
//! Kvasir 벤치마크 바이너리 진입점.
//! 설정 로드, 전송 어댑터 조립, 시그널 처리, 보고서 출력.

mod lifecycle;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use kvbench_core::config::{AppConfig, SensorProfile, SloConfig, Transport};
use kvbench_core::config_manager::ConfigManager;
use kvbench_latency::Benchmark;
use kvbench_network::build_subscriber;
use kvbench_network::http_client::KvasirRestClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;
use crate::report::OutputFormat;

/// Kvasir 변경 알림 지연 벤치마크
///
/// 합성 센서 측정값을 제출하고, 변경 알림이 도착하기까지의 지연을 측정한다.
#[derive(Parser, Debug)]
#[command(name = "kvbench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (JSON, 기본: 플랫폼 설정 디렉터리)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Kvasir 서버 URL
    #[arg(long, short = 's')]
    server: Option<String>,

    /// Bearer 토큰
    #[arg(long)]
    token: Option<String>,

    /// 알림 수신 방식 (sse, poll, graphql)
    #[arg(long, short = 't')]
    transport: Option<Transport>,

    /// 센서 ID 목록 (쉼표 구분)
    #[arg(long, value_delimiter = ',')]
    sensors: Vec<String>,

    /// 측정 시간 (초)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// 이벤트 생성 주기 (밀리초)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// 최대 샘플 수
    #[arg(long)]
    max_samples: Option<usize>,

    /// 드레인 최대 대기 (초)
    #[arg(long)]
    drain_timeout_secs: Option<u64>,

    /// p95 목표 (밀리초). p99 목표와 함께 주면 SLO 판정 활성화
    #[arg(long, requires = "p99_target_ms")]
    p95_target_ms: Option<f64>,

    /// p99 목표 (밀리초)
    #[arg(long, requires = "p95_target_ms")]
    p99_target_ms: Option<f64>,

    /// 소진율 경보 임계값
    #[arg(long)]
    burn_rate_threshold: Option<f64>,

    /// 출력 형식
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// 보고서 저장 경로 (기본: 표준 출력)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// CLI 오버라이드를 반영한 최종 설정을 설정 파일에 저장
    #[arg(long)]
    save_config: bool,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// crate별 로그 필터 문자열
fn log_filter(level: &str) -> String {
    ["kvbench", "kvbench_app", "kvbench_core", "kvbench_latency", "kvbench_network"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// 설정 로드 (파일 + 환경변수)
fn load_config(path: Option<&PathBuf>) -> Result<ConfigManager> {
    match path {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("설정 로드 실패")
}

/// 최종 설정을 관리자 경로에 저장
fn save_config(manager: &ConfigManager, config: &AppConfig) -> Result<()> {
    manager
        .update(config.clone())
        .with_context(|| format!("설정 저장 실패: {}", manager.config_path().display()))?;
    info!("설정 저장: {}", manager.config_path().display());
    Ok(())
}

/// CLI 인자로 설정 오버라이드
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    let server = &mut config.server;
    if let Some(url) = &args.server {
        server.base_url = url.clone();
    }
    if let Some(token) = &args.token {
        server.token = Some(token.clone());
    }
    if let Some(transport) = args.transport {
        server.transport = transport;
    }

    let bench = &mut config.benchmark;
    if !args.sensors.is_empty() {
        bench.sensors = args
            .sensors
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(SensorProfile::named)
            .collect();
    }
    if let Some(v) = args.duration_secs {
        bench.duration_secs = v;
    }
    if let Some(v) = args.interval_ms {
        bench.interval_ms = v;
    }
    if let Some(v) = args.max_samples {
        bench.max_samples = v;
    }
    if let Some(v) = args.drain_timeout_secs {
        bench.drain_timeout_secs = v;
    }

    if let (Some(p95), Some(p99)) = (args.p95_target_ms, args.p99_target_ms) {
        let slo = bench
            .slo
            .get_or_insert_with(|| SloConfig::with_targets(p95, p99));
        slo.p95_target_ms = p95;
        slo.p99_target_ms = p99;
    }
    if let (Some(threshold), Some(slo)) = (args.burn_rate_threshold, bench.slo.as_mut()) {
        slo.burn_rate_threshold = threshold;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(&args.log_level))),
        )
        .with_writer(std::io::stderr)
        .init();

    let manager = load_config(args.config.as_ref())?;
    let mut config = manager.get();
    apply_overrides(&mut config, &args);
    if args.burn_rate_threshold.is_some() && config.benchmark.slo.is_none() {
        warn!("SLO 목표 없이 --burn-rate-threshold 지정, 무시");
    }
    config.benchmark.validate().context("벤치마크 설정 검증 실패")?;
    if args.save_config {
        save_config(&manager, &config)?;
    }

    info!(
        "서버: {} (수신 방식: {})",
        config.server.base_url, config.server.transport
    );

    let submitter = Arc::new(KvasirRestClient::new(&config.server)?);
    let subscriber = build_subscriber(&config.server)?;
    let benchmark = Benchmark::new(config.benchmark.clone(), submitter, subscriber);

    let lifecycle = Arc::new(LifecycleManager::new());
    let watcher = lifecycle.watch_benchmark(benchmark.control());
    let signal_task = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.wait_for_signal().await })
    };

    let result = benchmark.run().await;
    signal_task.abort();
    watcher.abort();
    let report = result.context("벤치마크 실행 실패")?;

    let rendered = report::render(&report, args.format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("보고서 저장 실패: {}", path.display()))?;
            info!("보고서 저장: {}", path.display());
        }
        None => println!("{rendered}"),
    }

    if let Some(slo) = &report.slo {
        if !slo.compliant() {
            warn!(
                "SLO 미준수: p95 {:.1}ms, p99 {:.1}ms, 소진율 {:.2}",
                slo.p95_observed_ms, slo.p99_observed_ms, slo.burn_rate
            );
        }
    }
    Ok(())
}
