//! 보고서 출력 (텍스트 표 / JSON).

use clap::ValueEnum;
use kvbench_core::models::report::{BenchmarkReport, SloVerdict};
use std::fmt::Write;

/// 출력 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// 형식에 맞게 렌더링
pub fn render(report: &BenchmarkReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// 사람이 읽는 텍스트 표
pub fn render_text(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let s = &report.summary;
    let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;

    let _ = writeln!(out, "Kvasir 벤치마크 결과");
    let _ = writeln!(out, "{}", "=".repeat(44));
    let _ = writeln!(
        out,
        "기간: {} → {} ({elapsed:.1}s)",
        report.started_at.format("%H:%M:%S%.3f"),
        report.finished_at.format("%H:%M:%S%.3f")
    );
    let mut flags = Vec::new();
    if report.early_stop {
        flags.push("조기 종료");
    }
    if report.drain_timed_out {
        flags.push("드레인 타임아웃");
    }
    if !flags.is_empty() {
        let _ = writeln!(out, "상태: {}", flags.join(", "));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{:<16}{:>12}", "샘플", s.total_samples);
    for (label, value) in [
        ("평균 (ms)", s.average_latency),
        ("최소 (ms)", s.min_latency),
        ("최대 (ms)", s.max_latency),
        ("p50 (ms)", s.p50_latency),
        ("p95 (ms)", s.p95_latency),
        ("p99 (ms)", s.p99_latency),
        ("tail (p99/p50)", s.tail_ratio),
    ] {
        let _ = writeln!(out, "{label:<16}{value:>12.2}");
    }
    let _ = writeln!(out);

    let g = &report.generation;
    let c = &report.correlation;
    let _ = writeln!(
        out,
        "생성 {} / 제출 {} / 실패 {} / 중지 후 폐기 {}",
        g.generated, g.submitted, g.failed, g.dropped_after_stop
    );
    let _ = writeln!(
        out,
        "매칭 {} / 미스 {} / 백로그 {} / 형식 오류 {} / 시계 보정 {} / 상한 초과 {}",
        c.matched, c.misses, c.backlog_rejected, c.malformed, c.clock_skewed, c.rejected_full
    );
    let _ = writeln!(out, "미매칭 폐기 {}", report.unmatched_discarded);

    for breakdown in &report.breakdowns {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", breakdown.dimension);
        let _ = writeln!(
            out,
            "  {:<14}{:>8}{:>10}{:>10}{:>10}",
            "key", "count", "mean", "p95", "p99"
        );
        for group in &breakdown.groups {
            let _ = writeln!(
                out,
                "  {:<14}{:>8}{:>10.2}{:>10.2}{:>10.2}",
                group.key, group.count, group.mean, group.p95, group.p99
            );
        }
    }

    if let Some(slo) = &report.slo {
        let _ = writeln!(out);
        render_slo(&mut out, slo);
    }
    out
}

fn render_slo(out: &mut String, slo: &SloVerdict) {
    let mark = |ok: bool| if ok { "OK" } else { "위반" };
    let _ = writeln!(out, "SLO: {}", if slo.compliant() { "준수" } else { "미준수" });
    let _ = writeln!(
        out,
        "  p95 {:.2} / 목표 {:.2} [{}]",
        slo.p95_observed_ms,
        slo.p95_target_ms,
        mark(slo.p95_ok)
    );
    let _ = writeln!(
        out,
        "  p99 {:.2} / 목표 {:.2} [{}]",
        slo.p99_observed_ms,
        slo.p99_target_ms,
        mark(slo.p99_ok)
    );
    let _ = writeln!(
        out,
        "  소진율 {:.2} (윈도우 최대 {:.2}, 임계 {:.2}){}",
        slo.burn_rate,
        slo.max_window_burn_rate,
        slo.burn_rate_threshold,
        if slo.burning { " (소진 중)" } else { "" }
    );
}
