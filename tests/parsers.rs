// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use glusto_lib::{
        parse::{
            heal::{heal_complete, parse_heal_info},
            quota::parse_quota_list,
            rebalance::parse_migration_status,
            snapshot::parse_snap_info,
            volume::parse_volume_info,
            XmlElement,
        },
        test_env::test_path,
    };

    fn sample(name: &str) -> String {
        std::fs::read_to_string(test_path(&format!("xml/{name}"))).unwrap()
    }

    #[test]
    fn volume_info_sample() {
        let volumes = parse_volume_info(&sample("volume_info.xml")).unwrap();
        let info = &volumes["testvol_distributed-replicated"];
        assert_eq!(info.status, "Started");
        assert_eq!(info.type_str, "Distributed-Replicate");
        assert_eq!(info.brick_count, 6);
        assert_eq!(info.dist_count, 2);
        assert_eq!(info.replica_count, 3);
        assert_eq!(info.snapshot_count, 2);
        assert_eq!(info.transport, "tcp");
        assert_eq!(info.subvol_size(), 3);
        assert_eq!(
            info.bricks[4].name,
            "server2:/bricks/brick1/testvol_distributed-replicated_brick4"
        );
        assert!(info.bricks.iter().all(|b| !b.is_arbiter));
        assert_eq!(info.options["nfs.disable"], "on");
        assert_eq!(info.options.len(), 3);
    }

    #[test]
    fn quota_list_sample() {
        let limits = parse_quota_list(&sample("quota_list.xml")).unwrap();
        assert_eq!(limits.len(), 2);
        let root = &limits["/"];
        assert_eq!(root.hard_limit, 1 << 30);
        assert_eq!(root.soft_limit_percent, "80%");
        assert_eq!(root.used_space, Some(10485760));
        let dir = &limits["/dir1"];
        assert_eq!(dir.used_space, None);
        assert_eq!(dir.avail_space, None);
        assert_eq!(dir.hl_exceeded, "N/A");
    }

    #[test]
    fn snapshot_info_sample() {
        let snaps = parse_snap_info(&sample("snapshot_info.xml")).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].name, "testvol_snap0");
        assert_eq!(snaps[0].description.as_deref(), Some("$p3C!@l C#@R@cT#R$"));
        assert_eq!(snaps[0].origin_volume(), Some("testvol"));
        assert!(!snaps[0].is_activated());
        assert_eq!(snaps[1].description, None);
        assert!(snaps[1].is_activated());
    }

    #[test]
    fn heal_info_sample() {
        let bricks = parse_heal_info(&sample("heal_info.xml")).unwrap();
        assert_eq!(bricks.len(), 3);
        assert_eq!(bricks[0].number_of_entries, Some(2));
        assert_eq!(bricks[0].entries, vec!["/dir1/file1", "/dir1/file2"]);
        assert_eq!(bricks[1].number_of_entries, None);
        assert_eq!(bricks[1].status, "Transport endpoint is not connected");
        assert_eq!(bricks[2].host_uuid, "33333333-3333-3333-3333-333333333333");
        assert!(!heal_complete(&bricks));
        assert!(heal_complete(&bricks[2..]));
    }

    #[test]
    fn rebalance_status_sample() {
        let status = parse_migration_status(&sample("rebalance_status.xml")).unwrap();
        assert!(status.is_completed());
        assert_eq!(status.aggregate.files, 250);
        assert_eq!(status.aggregate.failures, 0);
        assert_eq!(status.aggregate.scanned, 1000);
        assert_eq!(status.nodes.len(), 2);
        assert_eq!(status.nodes["server2"].files, 130);
        assert_eq!(status.task_id, "3c0b9a2e-7d1f-4e55-a3b2-9f8e7d6c5b4a");
    }

    /// Re-serialising a parsed document and parsing it again gives the same records.
    #[test]
    fn canonical_form_parses_the_same() {
        for name in [
            "volume_info.xml",
            "quota_list.xml",
            "snapshot_info.xml",
            "heal_info.xml",
            "rebalance_status.xml",
        ] {
            let original = sample(name);
            let tree = XmlElement::parse(&original).unwrap();
            let canonical = tree.to_canonical_string();
            assert_eq!(XmlElement::parse(&canonical).unwrap(), tree, "{name}");
        }

        let canonical = XmlElement::parse(&sample("snapshot_info.xml"))
            .unwrap()
            .to_canonical_string();
        assert_eq!(
            parse_snap_info(&canonical).unwrap(),
            parse_snap_info(&sample("snapshot_info.xml")).unwrap()
        );
    }

    #[test]
    fn failed_operation_is_not_parsed() {
        let doc = "<cliOutput><opRet>-1</opRet><opErrno>30800</opErrno>\
                   <opErrstr>Volume nosuchvol does not exist</opErrstr></cliOutput>";
        let err = parse_volume_info(doc).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }
}
