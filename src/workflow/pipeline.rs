// src/workflow/pipeline.rs
//! Simulated phase bodies.
//!
//! The real pipeline calls external services (search, crawl, LLM scripting,
//! image/voice generators, storage, publishing). Those wrappers live outside
//! this crate; these handlers stand in for them behind the same
//! `PhaseHandler` boundary, reporting realistic costs and artifact shapes so
//! the engine, bus and selector are exercised end to end without network
//! credentials.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::selector::{AssetSelector, Beat};
use crate::workflow::handler::{PhaseContext, PhaseHandler, PhaseHandlers};
use crate::workflow::types::{ArtifactSet, PhaseOutput};

/// Per-phase simulated latency. Small enough to keep test runs fast.
const STEP_DELAY_MS: u64 = 25;

/// Max generated visuals per script; remaining beats fall back to b-roll.
const VISUAL_BUDGET: usize = 5;

async fn simulate_work() {
    sleep(Duration::from_millis(STEP_DELAY_MS)).await;
}

struct SearchPhase;

#[async_trait]
impl PhaseHandler for SearchPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        let urls: Vec<String> = (1..=3)
            .map(|i| format!("https://news.example.com/{}/article-{}", slug(&ctx.config.topic), i))
            .collect();
        Ok(PhaseOutput::new(
            serde_json::json!({ "query": ctx.config.topic, "urls": urls, "count": urls.len() }),
            0.02,
        ))
    }
}

struct CrawlPhase;

#[async_trait]
impl PhaseHandler for CrawlPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        // FullPipeline crawls a search hit; ArticleToScript treats the topic
        // itself as the article URL.
        let url = ctx
            .output_of("search")
            .and_then(|out| out["urls"].as_array())
            .and_then(|urls| urls.first())
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| ctx.config.topic.clone());
        let article = format!(
            "Full article text about {} gathered from {}.",
            ctx.config.topic, url
        );
        Ok(PhaseOutput::new(
            serde_json::json!({ "url": url, "article_text": article, "word_count": article.split_whitespace().count() }),
            0.05,
        ))
    }
}

struct StoreArticlePhase;

#[async_trait]
impl PhaseHandler for StoreArticlePhase {
    async fn execute(&self, _ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        Ok(PhaseOutput::new(
            serde_json::json!({ "article_id": uuid::Uuid::new_v4().to_string() }),
            0.01,
        ))
    }
}

struct GenerateScriptPhase;

#[async_trait]
impl PhaseHandler for GenerateScriptPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        let topic = &ctx.config.topic;
        let source = ctx
            .output_of("crawl")
            .and_then(|out| out["article_text"].as_str())
            .or_else(|| {
                ctx.output_of("search")
                    .and_then(|out| out["query"].as_str())
            })
            .unwrap_or(topic)
            .to_string();

        let beats = vec![
            Beat::new(format!("What if {} changed everything you know?", topic), "hook"),
            Beat::new(format!("Here is the background: {}", source), "context"),
            Beat::new(
                "But then came the breakthrough nobody expected",
                "revelation",
            ),
            Beat::new("The results were massive across the industry", "impact"),
            Beat::new("Let's break down exactly what this means", "analysis"),
            Beat::new("Follow for part two of this story", "call to action"),
        ];
        let script: String = beats
            .iter()
            .map(|beat| format!("**{}**: {}", beat.section, beat.text))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(PhaseOutput::new(
            serde_json::json!({ "script": script, "beats": beats, "style": ctx.config.style, "tone": ctx.config.tone }),
            0.08,
        ))
    }
}

struct StoreScriptPhase;

#[async_trait]
impl PhaseHandler for StoreScriptPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        if ctx.output_of("generate_script").is_none() {
            return Err("no script to store".to_string());
        }
        Ok(PhaseOutput::new(
            serde_json::json!({ "script_id": uuid::Uuid::new_v4().to_string() }),
            0.01,
        ))
    }
}

struct PromptGenerationPhase;

#[async_trait]
impl PhaseHandler for PromptGenerationPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        let beats = script_beats(ctx)?;
        let prompts: Vec<serde_json::Value> = beats
            .iter()
            .enumerate()
            .map(|(i, beat)| {
                serde_json::json!({
                    "scene_number": i + 1,
                    "visual_description": format!("Cinematic visualization of: {}", beat.text),
                    "mood_style": "dynamic, engaging",
                })
            })
            .collect();
        Ok(PhaseOutput::new(
            serde_json::json!({ "prompts": prompts }),
            0.05,
        ))
    }
}

struct ImageGenerationPhase;

#[async_trait]
impl PhaseHandler for ImageGenerationPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        let beats = script_beats(ctx)?;
        let selected = AssetSelector::select(&beats, VISUAL_BUDGET);

        let image_files: Vec<String> = selected
            .iter()
            .map(|i| format!("images/{}/scene_{}.png", ctx.workflow_id, i + 1))
            .collect();
        let fallback: Vec<usize> = (0..beats.len())
            .filter(|i| !selected.contains(i))
            .collect();

        let artifacts = ArtifactSet {
            image_files: image_files.clone(),
            ..Default::default()
        };
        Ok(PhaseOutput::new(
            serde_json::json!({ "generated_scenes": selected, "broll_fallback_scenes": fallback, "images": image_files }),
            0.05,
        )
        .with_artifacts(artifacts))
    }
}

struct BrollSearchPhase;

#[async_trait]
impl PhaseHandler for BrollSearchPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        let broll_files: Vec<String> = (1..=3)
            .map(|i| format!("broll/{}/clip_{}.mp4", ctx.workflow_id, i))
            .collect();
        let artifacts = ArtifactSet {
            broll_files: broll_files.clone(),
            ..Default::default()
        };
        Ok(PhaseOutput::new(
            serde_json::json!({ "clips": broll_files }),
            0.02,
        )
        .with_artifacts(artifacts))
    }
}

struct VoiceGenerationPhase;

#[async_trait]
impl PhaseHandler for VoiceGenerationPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        let voice_file = format!("voice/{}/narration.mp3", ctx.workflow_id);
        let artifacts = ArtifactSet {
            voice_files: vec![voice_file.clone()],
            notes: vec![format!("narration voiced in {} tone", ctx.config.tone)],
            ..Default::default()
        };
        Ok(PhaseOutput::new(
            serde_json::json!({ "voice_file": voice_file, "duration_seconds": 58.0 }),
            0.05,
        )
        .with_artifacts(artifacts))
    }
}

struct AssetGatheringPhase;

#[async_trait]
impl PhaseHandler for AssetGatheringPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        // Fan-in point: whatever the generation phases managed to produce is
        // organized into one project folder. Missing asset classes are fine.
        Ok(PhaseOutput::new(
            serde_json::json!({
                "project_folder": format!("projects/{}", ctx.workflow_id),
                "images": ctx.artifacts.image_files.len(),
                "voice_files": ctx.artifacts.voice_files.len(),
                "broll_clips": ctx.artifacts.broll_files.len(),
            }),
            0.05,
        ))
    }
}

struct PublishPhase;

#[async_trait]
impl PhaseHandler for PublishPhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        Ok(PhaseOutput::new(
            serde_json::json!({ "status": "published", "platforms": ctx.config.platforms }),
            0.01,
        ))
    }
}

struct FinalizePhase;

#[async_trait]
impl PhaseHandler for FinalizePhase {
    async fn execute(&self, ctx: &PhaseContext) -> Result<PhaseOutput, String> {
        simulate_work().await;
        Ok(PhaseOutput::new(
            serde_json::json!({
                "topic": ctx.config.topic,
                "assets_ready": !ctx.artifacts.is_empty(),
            }),
            0.0,
        ))
    }
}

fn script_beats(ctx: &PhaseContext) -> Result<Vec<Beat>, String> {
    let output = ctx
        .output_of("generate_script")
        .ok_or_else(|| "script beats unavailable: generate_script produced no output".to_string())?;
    serde_json::from_value(output["beats"].clone())
        .map_err(|e| format!("malformed script beats: {}", e))
}

fn slug(topic: &str) -> String {
    topic
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Handler table covering every phase name the registry declares.
pub fn simulated_handlers() -> PhaseHandlers {
    PhaseHandlers::new()
        .with("search", Arc::new(SearchPhase))
        .with("crawl", Arc::new(CrawlPhase))
        .with("store_article", Arc::new(StoreArticlePhase))
        .with("generate_script", Arc::new(GenerateScriptPhase))
        .with("store_script", Arc::new(StoreScriptPhase))
        .with("prompt_generation", Arc::new(PromptGenerationPhase))
        .with("image_generation", Arc::new(ImageGenerationPhase))
        .with("broll_search", Arc::new(BrollSearchPhase))
        .with("voice_generation", Arc::new(VoiceGenerationPhase))
        .with("asset_gathering", Arc::new(AssetGatheringPhase))
        .with("publish", Arc::new(PublishPhase))
        .with("finalize", Arc::new(FinalizePhase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{WorkflowConfig, WorkflowType};
    use std::collections::HashMap;

    fn context(outputs: HashMap<String, serde_json::Value>) -> PhaseContext {
        PhaseContext {
            workflow_id: "wf-test".to_string(),
            phase_name: "image_generation".to_string(),
            config: WorkflowConfig::new("rust async runtimes", WorkflowType::FullPipeline),
            outputs,
            artifacts: ArtifactSet::default(),
        }
    }

    #[tokio::test]
    async fn test_script_phase_emits_parseable_beats() {
        let ctx = context(HashMap::new());
        let output = GenerateScriptPhase.execute(&ctx).await.unwrap();
        let beats: Vec<Beat> = serde_json::from_value(output.data["beats"].clone()).unwrap();
        assert_eq!(beats.len(), 6);
        assert_eq!(beats[0].section, "hook");
    }

    #[tokio::test]
    async fn test_image_phase_splits_generated_and_fallback_scenes() {
        let mut outputs = HashMap::new();
        let script = GenerateScriptPhase.execute(&context(HashMap::new())).await.unwrap();
        outputs.insert("generate_script".to_string(), script.data);

        let output = ImageGenerationPhase.execute(&context(outputs)).await.unwrap();
        let generated = output.data["generated_scenes"].as_array().unwrap().len();
        let fallback = output.data["broll_fallback_scenes"].as_array().unwrap().len();
        assert_eq!(generated, 5);
        assert_eq!(generated + fallback, 6);
        assert_eq!(output.artifacts.image_files.len(), 5);
    }

    #[tokio::test]
    async fn test_image_phase_fails_fast_without_script() {
        let err = ImageGenerationPhase
            .execute(&context(HashMap::new()))
            .await
            .unwrap_err();
        assert!(err.contains("generate_script"));
    }
}
