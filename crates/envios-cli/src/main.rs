fn main() -> anyhow::Result<()> {
    envios_cli::run()
}
