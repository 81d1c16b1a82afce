//! 统一日志初始化
//! 所有模块通过 `log` 宏输出，这里负责把它们接到控制台和滚动日志文件上
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::{
    roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub root_dir: String,
    pub file_name: String,
    pub default_level: String,
    pub max_file_size_mb: u64,
    /// 保留的历史日志文件个数
    pub retention_files: u32,
    pub console_output: bool,
    pub file_output: bool,
    pub pattern: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            root_dir: "logs".to_string(),
            file_name: "rustperp".to_string(),
            default_level: "INFO".to_string(),
            max_file_size_mb: 10,
            retention_files: 30,
            console_output: true,
            file_output: true,
            pattern: "[{d(%Y-%m-%d %H:%M:%S%.3f)}] [{l}] [{M}] {m}{n}".to_string(),
        }
    }
}

impl LogConfig {
    /// 获取日志级别
    pub fn get_level_filter(&self) -> LevelFilter {
        match self.default_level.to_uppercase().as_str() {
            "TRACE" => LevelFilter::Trace,
            "DEBUG" => LevelFilter::Debug,
            "INFO" => LevelFilter::Info,
            "WARN" => LevelFilter::Warn,
            "ERROR" => LevelFilter::Error,
            "OFF" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }

    pub fn log_file_path(&self) -> String {
        format!("{}/{}.log", self.root_dir, self.file_name)
    }

    /// 构建 log4rs 配置
    pub fn build(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut builder = Config::builder();
        let mut root = Root::builder();

        if self.console_output {
            let console = ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new(&self.pattern)))
                .build();
            builder = builder.appender(Appender::builder().build("console", Box::new(console)));
            root = root.appender("console");
        }

        if self.file_output {
            if !Path::new(&self.root_dir).exists() {
                fs::create_dir_all(&self.root_dir)?;
            }

            let roller = FixedWindowRoller::builder().build(
                &format!("{}/{}.{{}}.log", self.root_dir, self.file_name),
                self.retention_files.max(1),
            )?;
            let trigger = SizeTrigger::new(self.max_file_size_mb.max(1) * 1024 * 1024);
            let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

            let file = RollingFileAppender::builder()
                .encoder(Box::new(PatternEncoder::new(&self.pattern)))
                .build(self.log_file_path(), Box::new(policy))?;
            builder = builder.appender(Appender::builder().build("file", Box::new(file)));
            root = root.appender("file");
        }

        Ok(builder.build(root.build(self.get_level_filter()))?)
    }
}

/// 初始化全局日志
pub fn init_logger(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_config = config.build()?;
    log4rs::init_config(log_config)?;

    log::info!(
        "✅ 日志系统已初始化: level={}, file={}",
        config.default_level,
        if config.file_output {
            config.log_file_path()
        } else {
            "-".to_string()
        }
    );
    Ok(())
}
