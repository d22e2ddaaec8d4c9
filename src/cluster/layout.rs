// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

use serde::Serialize;

use crate::{
    config::VolumeTypeConfig,
    error::{Error, Result},
};

/// The inner unit of a volume: how the bricks of one subvolume relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InnerLayout {
    /// Every brick is its own subvolume.
    Distributed,
    Replicated { replica: u32 },
    Dispersed { disperse: u32, redundancy: u32 },
    /// `replica` full copies plus `arbiter` metadata-only bricks per subvolume.
    Arbiter { replica: u32, arbiter: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Rdma,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Tcp => "tcp",
            Transport::Rdma => "rdma",
        })
    }
}

/// A resolved volume layout: the inner unit crossed with an outer distribution count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeLayout {
    /// The layout name this was resolved from, e.g. `distributed-replicated`.
    pub name: String,
    pub inner: InnerLayout,
    pub dist_count: u32,
    pub transport: Transport,
}

fn required(value: Option<u32>, field: &str, layout: &str) -> Result<u32> {
    value.ok_or_else(|| Error::Fixture(format!("layout '{layout}' needs '{field}'")))
}

impl VolumeLayout {
    /// Resolve a layout template. `name` is only used for naming and messages; the kind comes from
    /// the template's `type`.
    pub fn from_config(name: &str, template: &VolumeTypeConfig) -> Result<Self> {
        let kind = template.kind.as_deref().unwrap_or(name);
        let dist_count = template.dist_count.unwrap_or(1);

        let inner = match kind {
            "distributed" => InnerLayout::Distributed,
            "replicated" | "distributed-replicated" => InnerLayout::Replicated {
                replica: required(template.replica_count, "replica_count", name)?,
            },
            "dispersed" | "distributed-dispersed" => InnerLayout::Dispersed {
                disperse: required(template.disperse_count, "disperse_count", name)?,
                redundancy: required(template.redundancy_count, "redundancy_count", name)?,
            },
            "arbiter" | "distributed-arbiter" => {
                // The template carries the count the CLI takes, which includes the arbiter.
                let total = required(template.replica_count, "replica_count", name)?;
                let arbiter = template.arbiter_count.unwrap_or(1);
                InnerLayout::Arbiter {
                    replica: total.saturating_sub(arbiter),
                    arbiter,
                }
            }
            other => {
                return Err(Error::Fixture(format!(
                    "layout '{name}' has unknown type '{other}'"
                )))
            }
        };

        let transport = match template.transport.as_deref().unwrap_or("tcp") {
            "tcp" => Transport::Tcp,
            "rdma" => Transport::Rdma,
            other => {
                return Err(Error::Fixture(format!(
                    "layout '{name}' has unknown transport '{other}'"
                )))
            }
        };

        let layout = VolumeLayout {
            name: name.to_string(),
            inner,
            dist_count,
            transport,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Check the layout invariants.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Fixture(format!("layout '{}': {msg}", self.name)));
        if self.dist_count == 0 {
            return fail("dist_count must be at least 1".to_string());
        }
        match self.inner {
            InnerLayout::Distributed => {}
            InnerLayout::Replicated { replica } => {
                if replica < 2 {
                    return fail(format!("replica count {replica} is less than 2"));
                }
            }
            InnerLayout::Dispersed {
                disperse,
                redundancy,
            } => {
                if redundancy == 0 || 2 * redundancy >= disperse {
                    return fail(format!(
                        "redundancy {redundancy} must be above 0 and below half of disperse {disperse}"
                    ));
                }
            }
            InnerLayout::Arbiter { replica, arbiter } => {
                if arbiter != 1 {
                    return fail(format!("arbiter count must be 1, not {arbiter}"));
                }
                if replica < 2 {
                    return fail(format!("arbiter layouts need 2 data bricks, not {replica}"));
                }
            }
        }
        Ok(())
    }

    /// The number of bricks in one subvolume.
    pub fn inner_count(&self) -> usize {
        (match self.inner {
            InnerLayout::Distributed => 1,
            InnerLayout::Replicated { replica } => replica,
            InnerLayout::Dispersed { disperse, .. } => disperse,
            InnerLayout::Arbiter { replica, arbiter } => replica + arbiter,
        }) as usize
    }

    pub fn brick_count(&self) -> usize {
        self.dist_count as usize * self.inner_count()
    }

    /// The same layout with a different number of subvolumes.
    pub fn with_dist_count(&self, dist_count: u32) -> Self {
        VolumeLayout {
            dist_count,
            ..self.clone()
        }
    }

    /// How many bricks of one subvolume can be down without losing access to its data.
    pub fn fault_tolerance(&self) -> usize {
        (match self.inner {
            InnerLayout::Distributed => 0,
            InnerLayout::Replicated { replica } => replica - 1,
            InnerLayout::Dispersed { redundancy, .. } => redundancy,
            InnerLayout::Arbiter { replica, .. } => replica - 1,
        }) as usize
    }

    /// The layout words of `gluster volume create`, e.g. `replica 3 arbiter 1 transport tcp`.
    pub fn create_args(&self) -> Vec<String> {
        let mut args: Vec<String> = match self.inner {
            InnerLayout::Distributed => Vec::new(),
            InnerLayout::Replicated { replica } => vec!["replica".into(), replica.to_string()],
            InnerLayout::Dispersed {
                disperse,
                redundancy,
            } => vec![
                "disperse".into(),
                disperse.to_string(),
                "redundancy".into(),
                redundancy.to_string(),
            ],
            InnerLayout::Arbiter { replica, arbiter } => vec![
                "replica".into(),
                (replica + arbiter).to_string(),
                "arbiter".into(),
                arbiter.to_string(),
            ],
        };
        args.push("transport".into());
        args.push(self.transport.to_string());
        args
    }

    /// Group `bricks` into subvolumes of `inner_count` consecutive bricks.
    pub fn subvolumes<'a, T>(&self, bricks: &'a [T]) -> Result<Vec<&'a [T]>> {
        let inner = self.inner_count();
        if bricks.is_empty() || bricks.len() % inner != 0 {
            return Err(Error::Fixture(format!(
                "{} bricks cannot be grouped into subvolumes of {inner}",
                bricks.len()
            )));
        }
        Ok(bricks.chunks(inner).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_volume_type;

    fn builtin(name: &str) -> VolumeLayout {
        VolumeLayout::from_config(name, &default_volume_type(name).unwrap()).unwrap()
    }

    #[test]
    fn builtin_layouts_resolve() {
        let cases = [
            ("distributed", 1, 4),
            ("replicated", 3, 3),
            ("distributed-replicated", 3, 6),
            ("dispersed", 6, 6),
            ("distributed-dispersed", 6, 12),
            ("arbiter", 3, 3),
            ("distributed-arbiter", 3, 6),
        ];
        for (name, inner, total) in cases {
            let layout = builtin(name);
            assert_eq!(layout.inner_count(), inner, "{name}");
            assert_eq!(layout.brick_count(), total, "{name}");
        }
    }

    #[test]
    fn create_args() {
        assert_eq!(
            builtin("arbiter").create_args(),
            vec!["replica", "3", "arbiter", "1", "transport", "tcp"]
        );
        assert_eq!(
            builtin("dispersed").create_args(),
            vec!["disperse", "6", "redundancy", "2", "transport", "tcp"]
        );
        assert_eq!(builtin("distributed").create_args(), vec!["transport", "tcp"]);
    }

    #[test]
    fn invalid_layouts_are_fixture_errors() {
        let bad = [
            VolumeTypeConfig {
                kind: Some("dispersed".into()),
                disperse_count: Some(4),
                redundancy_count: Some(2),
                ..Default::default()
            },
            VolumeTypeConfig {
                kind: Some("replicated".into()),
                replica_count: Some(1),
                ..Default::default()
            },
            VolumeTypeConfig {
                kind: Some("arbiter".into()),
                replica_count: Some(3),
                arbiter_count: Some(2),
                ..Default::default()
            },
            VolumeTypeConfig {
                kind: Some("striped".into()),
                ..Default::default()
            },
        ];
        for template in bad {
            assert!(matches!(
                VolumeLayout::from_config("x", &template),
                Err(Error::Fixture(_))
            ));
        }
    }

    #[test]
    fn grouping_into_subvolumes() {
        let layout = builtin("distributed-replicated");
        let bricks: Vec<u32> = (0..6).collect();
        let subvols = layout.subvolumes(&bricks).unwrap();
        assert_eq!(subvols, vec![&[0, 1, 2][..], &[3, 4, 5][..]]);
        assert!(layout.subvolumes(&bricks[..5]).is_err());
        assert_eq!(layout.with_dist_count(3).brick_count(), 9);
    }
}
