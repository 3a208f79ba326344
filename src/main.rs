fn main() -> anyhow::Result<()> {
    followup_lib::run()
}
