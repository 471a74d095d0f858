// Multi-process lock smoke test for append serialization.
use std::process::{Command, Stdio};
use std::sync::Arc;

use packrec::api::{FileBackend, PacketTable};

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_packrec");
    Command::new(exe)
}

#[test]
fn concurrent_appends_are_serialized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join("store");

    let create = cmd()
        .args(["--dir", dir.to_str().unwrap(), "table", "create", "locked", "--record-size", "4"])
        .output()
        .expect("create");
    assert!(create.status.success());

    let workers = 8u32;
    let mut children = Vec::new();
    for i in 0..workers {
        let child = cmd()
            .args([
                "--dir",
                dir.to_str().unwrap(),
                "table",
                "append",
                "locked",
                "--as",
                "u32",
                &i.to_string(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn");
        children.push(child);
    }

    for mut child in children {
        let status = child.wait().expect("wait");
        assert!(status.success());
    }

    let backend = Arc::new(FileBackend::open(&dir).expect("open store"));
    let table = PacketTable::open(backend, "locked").expect("open");
    let mut values = table
        .scoped(|table| {
            assert_eq!(table.num_packets()?, u64::from(workers));
            let mut out: Vec<u32> = Vec::with_capacity(workers as usize);
            table.read_packets(0, workers as usize, &mut out)?;
            Ok(out)
        })
        .expect("read");
    values.sort_unstable();
    assert_eq!(values, (0..workers).collect::<Vec<_>>());
}

#[test]
fn threads_share_one_backend() {
    let temp = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(FileBackend::open(temp.path()).expect("open store"));
    let table = PacketTable::create(
        Arc::clone(&backend),
        "shared",
        &packrec::api::RecordType::of::<u64>(),
        packrec::api::TableOptions::default(),
    )
    .expect("create");
    table.scoped(|_| Ok(())).expect("close");

    let threads: Vec<_> = (0..4u64)
        .map(|worker| {
            let backend = Arc::clone(&backend);
            std::thread::spawn(move || {
                let table = PacketTable::open(backend, "shared").expect("open");
                table
                    .scoped(|table| {
                        for i in 0..25u64 {
                            table.append(&(worker * 100 + i))?;
                        }
                        Ok(())
                    })
                    .expect("append");
            })
        })
        .collect();
    for thread in threads {
        thread.join().expect("join");
    }

    let table = PacketTable::open(backend, "shared").expect("open");
    let count = table.scoped(|table| table.num_packets()).expect("count");
    assert_eq!(count, 100);
}
