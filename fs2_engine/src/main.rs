use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();
    let args = fs2_engine::cli::parse()?;
    fs2_engine::runtime::execute(args)
}
