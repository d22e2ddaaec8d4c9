// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::runtime::Runtime;

    use glusto_lib::{
        cluster::{
            brick::bring_bricks_offline,
            peer::probe_peers,
            rebalance::wait_for_rebalance_to_complete,
            snapshot::snapshot_create,
            volume::{cleanup_volume, expand_volume, setup_volume},
            VolumeLayout,
        },
        parse::rebalance::get_rebalance_status,
        test_env::*,
    };

    const VOL: &str = "testvol";

    fn replicated(env: &TestEnvironment) -> VolumeLayout {
        let template = env.config().volume_type("replicated").unwrap();
        VolumeLayout::from_config("replicated", &template).unwrap()
    }

    /// Make the fake report `VOL` as `status` with `bricks`, all of them online.
    fn volume_is(env: &TestEnvironment, status: &str, bricks: &[String]) {
        env.respond(
            &format!("volume info {VOL} --xml"),
            0,
            &volume_info_xml(VOL, status, 3, bricks),
        );
        env.respond(
            &format!("volume status {VOL} --xml"),
            0,
            &volume_status_xml(VOL, bricks),
        );
    }

    #[test]
    fn setup_volume_creates_then_starts() {
        let env = TestEnvironment::new("setup_volume_creates_then_starts");
        let cluster = env.cluster();
        let bricks = env.bricks(VOL, 3);
        env.respond("volume list", 0, "No volumes present in cluster\n");
        volume_is(&env, "Started", &bricks);

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(setup_volume(&cluster, cluster.mnode(), VOL, &replicated(&env), false)
                .await
                .unwrap());
        });

        let create = format!("volume create {VOL} replica 3 transport tcp {}", bricks.join(" "));
        assert!(env.position_of(&create) < env.position_of(&format!("volume start {VOL}")));
    }

    #[test]
    fn existing_volume_is_left_alone() {
        let env = TestEnvironment::new("existing_volume_is_left_alone");
        let cluster = env.cluster();
        env.respond("volume list", 0, &format!("other\n{VOL}\n"));
        volume_is(&env, "Started", &env.bricks(VOL, 3));

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(setup_volume(&cluster, cluster.mnode(), VOL, &replicated(&env), false)
                .await
                .unwrap());
        });
        assert!(!env.invocations().iter().any(|i| i.starts_with("volume create")));
        assert!(!env.invocations().iter().any(|i| i.starts_with("volume start")));
    }

    #[test]
    fn stopped_existing_volume_is_started() {
        let env = TestEnvironment::new("stopped_existing_volume_is_started");
        let cluster = env.cluster();
        let bricks = env.bricks(VOL, 3);
        env.respond("volume list", 0, &format!("{VOL}\n"));
        volume_is(&env, "Stopped", &bricks);
        env.respond_after(
            &format!("volume start {VOL}"),
            &format!("volume info {VOL} --xml"),
            0,
            &volume_info_xml(VOL, "Started", 3, &bricks),
        );

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(setup_volume(&cluster, cluster.mnode(), VOL, &replicated(&env), false)
                .await
                .unwrap());
        });
        env.assert_invoked(&format!("volume start {VOL}"));
        assert!(!env.invocations().iter().any(|i| i.starts_with("volume create")));
    }

    #[test]
    fn rejected_create_is_false() {
        let env = TestEnvironment::new("rejected_create_is_false");
        let cluster = env.cluster();
        env.respond("volume list", 0, "No volumes present in cluster\n");
        env.respond_error(
            "volume create *",
            1,
            "volume create: testvol: failed: Host server9 is not in 'Peer in Cluster' state",
        );

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(!setup_volume(&cluster, cluster.mnode(), VOL, &replicated(&env), false)
                .await
                .unwrap());
            let failed = cluster.executor().last_failure().unwrap();
            assert!(failed.command.starts_with("gluster volume create testvol"));
        });
        assert!(!env.invocations().iter().any(|i| i.starts_with("volume start")));
    }

    #[test]
    fn cleanup_stops_deletes_and_removes_bricks() {
        let env = TestEnvironment::new("cleanup_stops_deletes_and_removes_bricks");
        let cluster = env.cluster();
        let bricks = env.bricks(VOL, 3);
        volume_is(&env, "Started", &bricks);
        let brick_dir = env.path(&format!("bricks/{VOL}_brick0"));
        std::fs::create_dir_all(&brick_dir).unwrap();

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(cleanup_volume(cluster.executor(), cluster.mnode(), VOL)
                .await
                .unwrap());
        });

        let stop = env.position_of(&format!("--mode=script volume stop {VOL} force"));
        let delete = env.position_of(&format!("--mode=script volume delete {VOL}"));
        assert!(stop < delete);
        assert!(!std::path::Path::new(&brick_dir).exists());
    }

    #[test]
    fn cleanup_of_a_created_volume_skips_stop() {
        let env = TestEnvironment::new("cleanup_of_a_created_volume_skips_stop");
        let cluster = env.cluster();
        volume_is(&env, "Created", &env.bricks(VOL, 3));

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(cleanup_volume(cluster.executor(), cluster.mnode(), VOL)
                .await
                .unwrap());
        });
        assert!(!env.invocations().iter().any(|i| i.contains("volume stop")));
        env.assert_invoked(&format!("--mode=script volume delete {VOL}"));
    }

    #[test]
    fn cleanup_of_a_missing_volume_succeeds() {
        let env = TestEnvironment::new("cleanup_of_a_missing_volume_succeeds");
        let cluster = env.cluster();
        env.respond_error(
            &format!("volume info {VOL} --xml"),
            1,
            "Volume testvol does not exist",
        );
        env.respond("volume list", 0, "No volumes present in cluster\n");

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(cleanup_volume(cluster.executor(), cluster.mnode(), VOL)
                .await
                .unwrap());
        });
        assert!(!env.invocations().iter().any(|i| i.contains("volume delete")));
    }

    #[test]
    fn expand_adds_one_subvolume() {
        let env = TestEnvironment::new("expand_adds_one_subvolume");
        let cluster = env.cluster();
        let all = env.bricks(VOL, 6);
        env.respond(
            &format!("volume info {VOL} --xml"),
            0,
            &volume_info_xml(VOL, "Started", 3, &all[..3]),
        );
        env.respond_after(
            &format!("volume add-brick {VOL} *"),
            &format!("volume info {VOL} --xml"),
            0,
            &volume_info_xml(VOL, "Started", 3, &all),
        );
        env.respond(
            &format!("volume status {VOL} --xml"),
            0,
            &volume_status_xml(VOL, &all),
        );

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(expand_volume(&cluster, cluster.mnode(), VOL, 1, false, None)
                .await
                .unwrap());
        });
        env.assert_invoked(&format!("volume add-brick {VOL} {}", all[3..].join(" ")));
    }

    #[test]
    fn expand_after_shrink_uses_fresh_paths() {
        let env = TestEnvironment::new("expand_after_shrink_uses_fresh_paths");
        let cluster = env.cluster();
        let all = env.bricks(VOL, 12);
        // The volume keeps reporting two subvolumes: whatever the first expansion added was
        // removed again before the second one.
        env.respond(
            &format!("volume info {VOL} --xml"),
            0,
            &volume_info_xml(VOL, "Started", 3, &all[..6]),
        );
        env.respond(
            &format!("volume status {VOL} --xml"),
            0,
            &volume_status_xml(VOL, &all),
        );

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            for _ in 0..2 {
                assert!(expand_volume(&cluster, cluster.mnode(), VOL, 1, false, None)
                    .await
                    .unwrap());
            }
        });
        env.assert_invoked(&format!("volume add-brick {VOL} {}", all[6..9].join(" ")));
        env.assert_invoked(&format!("volume add-brick {VOL} {}", all[9..].join(" ")));
    }

    #[test]
    fn bringing_a_brick_offline_kills_its_process() {
        let env = TestEnvironment::new("bringing_a_brick_offline_kills_its_process");
        let cluster = env.cluster();
        let bricks = env.bricks(VOL, 3);
        let mut brick = std::process::Command::new("sleep").arg("60").spawn().unwrap();
        let pid = format!("<pid>{}</pid>", brick.id());

        let online = volume_status_xml(VOL, &bricks).replacen("<pid>3000</pid>", &pid, 1);
        let offline = online
            .replacen("<status>1</status>", "<status>0</status>", 1)
            .replacen(&pid, "<pid>-1</pid>", 1);
        env.respond(
            &format!("volume info {VOL} --xml"),
            0,
            &volume_info_xml(VOL, "Started", 3, &bricks),
        );
        env.respond(&format!("volume status {VOL} --xml"), 0, &online);
        // Volume info is only read once the kill was sent, while waiting for the brick to drop.
        env.respond_after(
            &format!("volume info {VOL} --xml"),
            &format!("volume status {VOL} --xml"),
            0,
            &offline,
        );

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(
                bring_bricks_offline(cluster.executor(), cluster.mnode(), VOL, &bricks[..1])
                    .await
                    .unwrap()
            );
        });
        assert!(!brick.wait().unwrap().success());
    }

    #[test]
    fn rebalance_completion_is_observed() {
        let env = TestEnvironment::new("rebalance_completion_is_observed");
        let cluster = env.cluster();
        env.respond_with_file(
            &format!("volume rebalance {VOL} status --xml"),
            "rebalance_status.xml",
        );

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let executor = cluster.executor();
            let status = get_rebalance_status(executor, cluster.mnode(), VOL)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(status.aggregate.files, 250);
            assert!(wait_for_rebalance_to_complete(
                executor,
                cluster.mnode(),
                VOL,
                Duration::from_secs(6)
            )
            .await
            .unwrap());
        });
    }

    #[test]
    fn snapshot_description_reaches_the_cli_intact() {
        let env = TestEnvironment::new("snapshot_description_reaches_the_cli_intact");
        let cluster = env.cluster();
        let description = "$p3C!@l C#@R@cT#R$";

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(snapshot_create(
                cluster.executor(),
                cluster.mnode(),
                VOL,
                "snap1",
                Some(description),
                false
            )
            .await
            .unwrap());
        });
        env.assert_invoked(&format!(
            "snapshot create snap1 {VOL} no-timestamp description {description}"
        ));
    }

    #[test]
    fn connected_peers_are_not_probed() {
        let env = TestEnvironment::new("connected_peers_are_not_probed");
        let cluster = env.cluster();
        env.respond("peer status --xml", 0, &peer_status_xml(&SERVERS[1..]));

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            assert!(probe_peers(cluster.executor(), cluster.mnode(), cluster.servers())
                .await
                .unwrap());
        });
        assert!(!env.invocations().iter().any(|i| i.starts_with("peer probe")));
    }
}
