use {
    dayroll::RotatingWriter,
    std::{sync::Arc, thread},
};

/// Several worker threads share one writer; a supervisor rotates it when due.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::current_dir()?.join("logs").join("workers.log");
    let writer = Arc::new(RotatingWriter::new(path, 14)?);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for job in 0..100 {
                    writer.write_all(format!("worker {worker} finished job {job}\n").as_bytes())?;
                }
                Ok::<_, dayroll::RotateError>(())
            })
        })
        .collect();

    if writer.rotate_safe()? {
        println!("rotated {}", writer.path().display());
    }

    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    for archive in writer.archives()? {
        println!("{} : {}", archive.date, archive.path.display());
    }
    Ok(())
}
