// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tokio::runtime::Runtime;

    use glusto_lib::{
        test_env::{TestEnvironment, CLIENT, SERVERS},
        Error,
    };

    #[test]
    fn run_returns_the_triple() {
        let env = TestEnvironment::new("run_returns_the_triple");
        let cluster = env.cluster();
        let executor = cluster.executor();

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let result = executor
                .run(SERVERS[0], "echo out; echo err >&2; exit 3")
                .await
                .unwrap();
            assert_eq!(result.status, 3);
            assert_eq!(result.stdout, "out\n");
            assert_eq!(result.stderr, "err\n");
            assert!(!result.success());

            let failed = executor.last_failure().unwrap();
            assert_eq!(failed.host, SERVERS[0]);
            assert_eq!(failed.command, "echo out; echo err >&2; exit 3");
            assert_eq!(failed.result, result);

            executor.clear_last_failure();
            assert!(executor.run(SERVERS[0], "true").await.unwrap().success());
            assert!(executor.last_failure().is_none());
        });
    }

    #[test]
    fn async_matches_sync() {
        let env = TestEnvironment::new("async_matches_sync");
        let cluster = env.cluster();
        let executor = cluster.executor();
        let command = "printf 'a b\\n'; echo oops >&2; exit 2";

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let sync = executor.run(CLIENT, command).await.unwrap();
            let proc = executor.run_async(CLIENT, command).unwrap();
            assert_eq!(proc.host(), CLIENT);
            assert_eq!(proc.command(), command);

            let first = proc.await_completion().await.unwrap();
            assert_eq!(first, sync);
            assert!(proc.is_complete());

            // Completion is observed once and then remembered.
            let second = proc.await_completion().await.unwrap();
            assert_eq!(first, second);
        });
    }

    #[test]
    fn parallel_runs_on_every_host() {
        let env = TestEnvironment::new("parallel_runs_on_every_host");
        let cluster = env.cluster();

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let results = cluster
                .executor()
                .run_parallel(cluster.servers(), "echo ok")
                .await
                .unwrap();
            assert_eq!(results.len(), SERVERS.len());
            for server in SERVERS {
                assert_eq!(results[server].stdout, "ok\n");
                assert!(results[server].success());
            }
        });
    }

    #[test]
    fn upload_writes_contents_and_mode() {
        let env = TestEnvironment::new("upload_writes_contents_and_mode");
        let cluster = env.cluster();
        let path = env.path("nested/dir/payload.txt");

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let uploaded = cluster
                .executor()
                .upload(CLIENT, b"line one\nline 'two'\n", &path, 0o640)
                .await
                .unwrap();
            assert!(uploaded);
        });

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "line one\nline 'two'\n"
        );
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn terminate_stops_a_background_command() {
        let env = TestEnvironment::new("terminate_stops_a_background_command");
        let cluster = env.cluster();
        let executor = cluster.executor();
        let marker = env.path("finished");

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let proc = executor
                .run_async(CLIENT, &format!("sleep 30; touch {marker}"))
                .unwrap();
            // Let the command record its process group.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            assert!(!proc.is_complete());

            proc.terminate(executor).await.unwrap();
            let result = proc.await_completion().await.unwrap();
            assert!(!result.success());
            assert!(proc.is_complete());
        });
        assert!(!std::path::Path::new(&marker).exists());
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let env = TestEnvironment::new("unreachable_host_is_a_transport_error");
        let cluster = env.cluster();

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let err = cluster
                .executor()
                .run("nonexistent.invalid", "true")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Transport { .. }), "got {err}");
        });
    }
}
