fn main() -> anyhow::Result<()> {
    media_time_lib::run()
}
