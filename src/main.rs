use anyhow::Result;
use assignment_grader::utils::logging;
use assignment_grader::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    config.validate()?;

    // 初始化并运行应用
    let _reports = App::initialize(config).await?.run().await?;

    Ok(())
}
