use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use bufscan::*;
use std::path::{Path, PathBuf};

// Scenario sources for latency benchmarks.
// All scenarios extract without error diagnostics.

const SHADER_SOURCE: &str = r#"
struct Light
{
    float3 direction;
    float intensity;
    float4 color;
};

cbuffer PerFrame : register(b0)
{
    float4x4 viewProj;
    float3 eyePos;
    float time;
    Light sun;
};

cbuffer PerDraw : register(b1, space1)
{
    float4x4 world;
    uint materialIndex;
    uint3 pad;
};

StructuredBuffer<Light> Lights : register(t4);
Texture2D<float4> Albedo : register(t0);
SamplerState LinearClamp : register(s0);
"#;

const HOST_SOURCE: &str = r#"
#pragma once
struct LightData
{
    DirectX::XMFLOAT3 direction;
    float intensity;
    DirectX::XMFLOAT4 color;
};

struct PerFrameConstants
{
    DirectX::XMFLOAT4X4 viewProj;
    DirectX::XMFLOAT3 eyePos;
    float time;
    LightData sun;
};
static_assert(offsetof(PerFrameConstants, sun) == 80, "layout");

struct PerDrawConstants
{
    DirectX::XMFLOAT4X4 world;
    uint32_t materialIndex;
    uint32_t pad[3];
};
"#;

/// Scaling generator: `n` cbuffers with a matching host struct each.
/// Field names drift slightly so alignment exercises the name metric.
fn generate_scaling_tree(n: usize) -> (String, String) {
    let mut shader = String::new();
    let mut host = String::new();
    for i in 0..n {
        shader.push_str(&format!(
            "cbuffer Block{} : register(b{})\n{{\n    float4 tint{};\n    float3 dir{};\n    float scale;\n    uint flags;\n}};\n\n",
            i, i % 14, i, i
        ));
        host.push_str(&format!(
            "struct Block{}Data\n{{\n    XMFLOAT4 m_tint{};\n    XMFLOAT3 direction{};\n    float scale;\n    uint32_t flags;\n}};\n\n",
            i, i, i
        ));
    }
    (shader, host)
}

fn expanded(path: &str, text: &str) -> source::ExpandedSource {
    source::ExpandedSource::identity(Path::new(path), text.to_string())
}

fn build_pool(shader: &str, host: &str) -> decl::DeclPool {
    let config = config::ExtractConfig::default();
    let mut decls = Vec::new();
    for (path, text, dialect) in [
        ("bench.hlsl", shader, decl::Dialect::ShaderSide),
        ("bench.h", host, decl::Dialect::HostSide),
    ] {
        let extraction = extract::extract(&expanded(path, text), dialect, &config);
        for draft in extraction.drafts {
            let id = id::DeclId(decls.len() as u32);
            decls.push(draft.into_declaration(id, PathBuf::from(path)));
        }
    }
    decl::DeclPool::new(decls)
}

struct MemorySources(Vec<(PathBuf, String)>);

impl source::Preprocessor for MemorySources {
    fn expand(&self, file: &Path) -> Result<source::ExpandedSource, source::PreprocessError> {
        self.0
            .iter()
            .find(|(p, _)| p == file)
            .map(|(_, text)| source::ExpandedSource::identity(file, text.clone()))
            .ok_or_else(|| source::PreprocessError::Io {
                path: file.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not in memory"),
            })
    }
}

// Lexer throughput on the shader scenario.
fn bench_lex(c: &mut Criterion) {
    c.bench_function("lex/shader", |b| {
        b.iter(|| black_box(lexer::lex(black_box(SHADER_SOURCE))));
    });
}

// Extraction latency per dialect.
fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let config = config::ExtractConfig::default();
    let shader = expanded("bench.hlsl", SHADER_SOURCE);
    let host = expanded("bench.h", HOST_SOURCE);

    group.bench_function("shader", |b| {
        b.iter(|| black_box(extract::extract(&shader, decl::Dialect::ShaderSide, &config)));
    });
    group.bench_function("host", |b| {
        b.iter(|| black_box(extract::extract(&host, decl::Dialect::HostSide, &config)));
    });
    group.finish();
}

// Name metrics on representative field-name pairs.
fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");
    let pairs = [
        ("lightDir", "m_lightDirection"),
        ("viewProj", "ViewProjection"),
        ("tint", "tints"),
        ("materialIndex", "g_material_index"),
    ];
    let seq = similarity::SequenceRatio;
    let jw = similarity::JaroWinkler::default();
    let metrics: [(&str, &dyn similarity::NameSimilarity); 2] =
        [("sequence_ratio", &seq), ("jaro_winkler", &jw)];

    for (name, metric) in metrics {
        group.bench_function(name, |b| {
            b.iter(|| {
                for (l, r) in &pairs {
                    let l = similarity::normalize_field_name(l);
                    let r = similarity::normalize_field_name(r);
                    black_box(metric.similarity(&l, &r));
                }
            });
        });
    }
    group.finish();
}

// Scaling: resolve + align across growing declaration counts.
fn bench_align_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("align/scaling");
    let config = config::AlignConfig::default();

    for n in [10usize, 50, 200] {
        let (shader, host) = generate_scaling_tree(n);
        let pool = build_pool(&shader, &host);
        let resolution = resolve::resolve(&pool);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let aligner = align::Aligner::new(&config);
                black_box(aligner.align_all(&pool, &resolution))
            });
        });
    }
    group.finish();
}

// Full analysis (scan -> resolve -> align -> aggregate -> detect) over memory sources.
fn bench_full_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis/full");

    for n in [10usize, 100] {
        let (shader, host) = generate_scaling_tree(n);
        let shader_path = PathBuf::from("shaders/Features/Bench/Bench.hlsl");
        let host_path = PathBuf::from("src/Bench.h");
        let sources = vec![
            (shader_path.clone(), shader),
            (host_path.clone(), host),
        ];
        let input = pipeline::AnalysisInput::new(vec![shader_path], vec![host_path]);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let analyzer = pipeline::Analyzer::new(config::AnalysisConfig::default())
                    .with_shader_preprocessor(Box::new(MemorySources(sources.clone())))
                    .with_host_preprocessor(Box::new(MemorySources(sources.clone())));
                black_box(analyzer.run(&input))
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_lex,
    bench_extract,
    bench_similarity,
    bench_align_scaling,
    bench_full_analysis
);
criterion_main!(benches);
