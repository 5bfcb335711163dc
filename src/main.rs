fn main() -> anyhow::Result<()> {
    trace_filter::run()
}
