use competition_runner::prelude::*;

fn main() -> anyhow::Result<()> {
    let configuration = Configuration::from_env();
    let inputs = Inputs::from_env()?;
    CompetitionDriver::new(configuration, inputs).run()
}
