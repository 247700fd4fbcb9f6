fn main() -> anyhow::Result<()> {
    lettercraft::cli::run()
}
