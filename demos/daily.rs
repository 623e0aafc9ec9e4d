use {
    dayroll::{Retention, RotatingWriterBuilder, TimeZone},
    std::io::Write,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::current_dir()?.join("logs").join("daily.log");
    let mut logger = RotatingWriterBuilder::new(path)
        .time_zone(TimeZone::UTC) // Use UTC for consistent timing across different regions
        .retention(Retention::Days(7)) // Keep one week of archives
        .rotate_on_write(true)
        .build()?;

    // Once the UTC day changes, the next write moves daily.log to YYYY-MM-DD-daily.log
    writeln!(logger, "System startup - UTC dates will be used for rotation")?;
    writeln!(logger, "Configuration loaded successfully")?;
    writeln!(logger, "Server listening on port 8080")?;

    logger.close()?;
    Ok(())
}
