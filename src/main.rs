use actix::prelude::*;
use anyhow::Context as _;
use coursedown::cli;
use coursedown::core::companion::CompanionWriter;
use coursedown::core::metadata::{CourseCache, ManifestProvider, MetadataProvider};
use coursedown::core::placement::ArtifactPlacer;
use coursedown::core::source::{
    ClipSource, Credential, CredentialProvider, HttpClipSource, StaticCredentials, TemplateResolver,
};
use coursedown::core::task::TransferExecutor;
use coursedown::core::{DownloadQueueActor, EnqueueCourse, EventHub, QueryQueue, QueueEvent, TransferProgress};
use coursedown::ui::{self, DownloadSummary, ProgressManager};
use coursedown::utils::logger::{Flush, LoggerActor, LoggerExt};
use coursedown::utils::validator::{validate_output_path, validate_speed_limit};
use log::LevelFilter;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok((args, config)) => (args, config),
        Err(e) => {
            ui::print_error(&format!("参数解析失败: {}", e));
            std::process::exit(1);
        }
    };
    validate_output_path(&config.download_dir)?;
    validate_speed_limit(config.speed_limit_kb)?;

    let logger = LoggerActor::new(&config.log_file, LevelFilter::Info, config.log_max_size)
        .with_context(|| format!("无法打开日志文件 {}", config.log_file))?
        .start();
    logger.info("程序启动");
    logger.info(&config.get_summary());

    let manifests = match args.get_manifests() {
        Ok(manifests) => manifests,
        Err(e) => {
            ui::print_error(&e.to_string());
            std::process::exit(1);
        }
    };

    let provider = ManifestProvider::new(CourseCache::new(None));
    let mut courses = Vec::new();
    for manifest in &manifests {
        match provider.course(manifest).await {
            Ok(course) => courses.push(course),
            Err(e) => {
                logger.error(&format!("加载课程清单失败: {}", e));
                ui::print_error(&e.to_string());
            }
        }
    }
    if courses.is_empty() {
        std::process::exit(1);
    }
    if !args.json {
        ui::print_info(&config.get_summary());
    }

    // 组装队列
    let hub = EventHub::new(config.event_capacity);
    let source: Rc<dyn ClipSource> = Rc::new(HttpClipSource::new(&config));
    let credentials: Rc<dyn CredentialProvider> =
        Rc::new(StaticCredentials::new(Credential::new(config.auth_cookie.clone())));
    let placer = ArtifactPlacer::new(&config.download_dir);
    let executor = Rc::new(TransferExecutor::new(
        source.clone(),
        Rc::new(TemplateResolver::from_config(&config)),
        credentials.clone(),
        placer.clone(),
        hub.clone(),
        config.transfer_settings(),
    ));
    let companions = Rc::new(CompanionWriter::new(placer, source, credentials));

    let mut progress_rx = hub.subscribe_progress();
    let mut queue_rx = hub.subscribe_queue();
    let queue = DownloadQueueActor::new(executor, companions, config.retry_strategy(), hub).start();

    let mut total = 0;
    for course in &courses {
        total += queue
            .send(EnqueueCourse { course: Arc::clone(course), module: args.module })
            .await?;
    }
    if total == 0 {
        ui::print_warning("没有可下载的片段");
        return Ok(());
    }
    logger.info(&format!("开始下载 {} 个片段", total));

    let started = Instant::now();
    let mut summary = DownloadSummary::new(total);
    let mut progress = if args.json { ProgressManager::hidden() } else { ProgressManager::new() };

    loop {
        tokio::select! {
            received = progress_rx.recv() => match received {
                Ok(p) if args.json => emit_progress_json(&p),
                Ok(p) => {
                    progress.apply(&p);
                }
                Err(RecvError::Lagged(n)) => log::debug!("跳过 {} 条进度事件", n),
                Err(RecvError::Closed) => break,
            },
            received = queue_rx.recv() => match received {
                Ok(event) => {
                    logger.journal(&event);
                    summary.record(&event);
                    if args.json {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        progress.on_queue_event(&event);
                        progress.println(&ui::event_notice(&event));
                    }
                    if matches!(event, QueueEvent::Drained | QueueEvent::Halted { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => log::warn!("跳过 {} 条队列事件", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                ui::print_warning("用户中断，未完成的片段下次运行时重新下载");
                logger.info("用户中断下载");
                break;
            }
        }
    }

    progress.finish();
    summary.elapsed_time = started.elapsed();
    let snapshot = queue.send(QueryQueue).await?;
    let unfinished = snapshot.count(|s| s.is_active());

    if !args.json {
        println!("{}", summary);
        if unfinished > 0 {
            ui::print_warning(&format!("{} 个片段未下载", unfinished));
        } else if summary.all_succeeded() {
            ui::print_success(&format!("{} 个片段全部下载完成", summary.success_count));
        }
    }
    logger.info(&format!(
        "下载结束 - 成功: {}, 失败: {}, 未完成: {}",
        summary.success_count, summary.failed_count, unfinished
    ));
    logger.send(Flush).await?;

    if summary.halted {
        std::process::exit(2);
    }
    Ok(())
}

/// JSON 模式下的进度行，带 `"event": "progress"` 标签
fn emit_progress_json(progress: &TransferProgress) {
    match serde_json::to_value(progress) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.insert("event".into(), "progress".into());
            println!("{}", serde_json::Value::Object(map));
        }
        Ok(other) => println!("{}", other),
        Err(e) => log::warn!("无法序列化进度事件: {}", e),
    }
}
