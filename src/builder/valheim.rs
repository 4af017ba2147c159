use kube::ResourceExt;

use super::{BoundClaim, ClaimSpec, EnvList};
use crate::credential::PASSWORD_KEY;
use crate::crd::{GameServer, Valheim};
use crate::error::{Error, Result};
use crate::types::{
    Container, ContainerPort, Labels, Resources, SecurityContext, Service, ServicePort,
    StatefulSet,
};

pub const GAME_PORT: i32 = 2456;
pub const QUERY_PORT: i32 = 2457;

pub const WORLD_VOLUME: &str = "worlddata";
pub const WORLD_MOUNT: &str = "/opt/valheim";
pub const BACKUP_VOLUME: &str = "backups";
pub const BACKUP_MOUNT: &str = "/config/backups";

const BACKUPS_IF_IDLE: &str = "true";
const BACKUPS_MAX_COUNT: &str = "5";

fn ports() -> [ContainerPort; 2] {
    [
        ContainerPort::udp("game", GAME_PORT),
        ContainerPort::udp("query", QUERY_PORT),
    ]
}

pub fn claims(server: &Valheim) -> Result<Vec<ClaimSpec>> {
    let name = server.name_any();
    let labels = server.child_labels();

    let mut claims = vec![ClaimSpec::new(
        WORLD_VOLUME,
        WORLD_MOUNT,
        &name,
        &server.spec.storage,
        &labels,
    )?];
    if server.spec.backups.has_claim() {
        claims.push(ClaimSpec::new(
            BACKUP_VOLUME,
            BACKUP_MOUNT,
            format!("{name}-backups"),
            &server.spec.backups.storage,
            &labels,
        )?);
    }
    Ok(claims)
}

/// Extra arguments for the dedicated server binary. World modifiers follow the
/// user's own arguments.
pub fn server_args(server: &Valheim) -> Vec<String> {
    let modifiers = &server.spec.world_modifiers;
    let mut args = server.spec.server.additional_args.clone();

    for (key, value) in [
        ("combat", &modifiers.combat),
        ("deathpenalty", &modifiers.death_penalty),
        ("raids", &modifiers.raids),
        ("resources", &modifiers.resource_rate),
        ("portals", &modifiers.portals),
    ] {
        if !value.is_empty() {
            args.push(format!("-modifier {key} {value}"));
        }
    }
    if !modifiers.hammer_mode.is_empty() {
        args.push(format!("-setkey {}", modifiers.hammer_mode));
    }
    args
}

pub fn env(server: &Valheim, password_secret: &str, backup_claim: bool) -> EnvList {
    let spec = &server.spec;

    let env = EnvList::new()
        .value("SERVER_NAME", server.server_name())
        .value("WORLD_NAME", server.world_name())
        .secret("SERVER_PASS", password_secret, PASSWORD_KEY)
        .joined("SERVER_ARGS", &server_args(server))
        .flag(spec.server.public, "SERVER_PUBLIC");

    let env = if spec.backups.schedule.is_empty() {
        env
    } else {
        env.value("BACKUPS_CRON", spec.backups.schedule.as_str())
            .value("BACKUPS_IF_IDLE", BACKUPS_IF_IDLE)
            .value("BACKUPS_MAX_COUNT", BACKUPS_MAX_COUNT)
    };
    let env = if backup_claim {
        env.value("BACKUPS_DIRECTORY", BACKUP_MOUNT)
    } else {
        env
    };

    env.joined("ADMINLIST_IDS", &spec.access.admins)
        .joined("BANNEDLIST_IDS", &spec.access.banned)
        .joined("PERMITTEDLIST_IDS", &spec.access.permitted)
        .entries(spec.hooks.entries())
        .extra(&spec.server.additional_env)
}

pub fn workload(server: &Valheim, labels: &Labels, claims: &[BoundClaim]) -> Result<StatefulSet> {
    let name = server.name_any();
    let credential = server
        .credential()
        .ok_or(Error::MissingField("spec.server.password"))?;
    let backup_claim = claims.iter().any(|c| c.volume == BACKUP_VOLUME);
    let resources = &server.spec.server.resources;

    let container = ports().into_iter().fold(
        Container::new("server", server.image())
            .image_pull_policy(Some(server.spec.image.pull_policy()))
            .env(env(server, &credential.name, backup_claim).into_vars())
            .resources(Resources::new(
                resources.limits.clone(),
                resources.requests.clone(),
            ))
            .security_context(SecurityContext::new().add_capability("SYS_NICE")),
        |container, port| container.port(port),
    );
    let container = claims.iter().fold(container, |container, claim| {
        container.volume_mount(&claim.volume, &claim.mount_path)
    });

    let workload = StatefulSet::new(&name, labels)
        .replicas(1)
        .service_account(&name)
        .share_process_namespace()
        .rolling_update()
        .container(container);

    Ok(claims
        .iter()
        .fold(workload, |workload, claim| workload.volume(claim.volume())))
}

pub fn service(server: &Valheim, labels: &Labels) -> Service {
    ports().iter().fold(
        Service::new(server.name_any(), labels).type_(server.spec.service.service_type()),
        |service, port| service.port(ServicePort::matching(port)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{SecretReference, StorageSpec, ValheimSpec};
    use crate::types::{ChildResource, EnvVar};
    use std::collections::BTreeMap;

    fn valheim() -> Valheim {
        let mut server = Valheim::new(
            "v1",
            ValheimSpec {
                storage: StorageSpec {
                    size: "1Gi".into(),
                    class: None,
                },
                ..Default::default()
            },
        );
        server.metadata.namespace = Some("games".into());
        server.spec.server.password = Some(SecretReference {
            name: "v1".into(),
            namespace: Some("games".into()),
        });
        server
    }

    #[test]
    fn defaults_fill_server_and_world_names() {
        let server = valheim();
        let env = env(&server, "v1", false);

        assert_eq!(env.names(), vec!["SERVER_NAME", "WORLD_NAME", "SERVER_PASS"]);
        assert_eq!(
            env.get("SERVER_NAME"),
            Some(&EnvVar::Value {
                name: "SERVER_NAME".into(),
                value: "Hosted by Gamely".into()
            })
        );
        assert_eq!(
            env.get("SERVER_PASS"),
            Some(&EnvVar::SecretRef {
                name: "SERVER_PASS".into(),
                secret_name: "v1".into(),
                key: "password".into()
            })
        );
    }

    #[test]
    fn full_table_is_emitted_in_order() {
        let mut server = valheim();
        server.spec.server.name = "Midgard".into();
        server.spec.server.public = true;
        server.spec.server.additional_args = vec!["-crossplay".into()];
        server.spec.world_modifiers.combat = "hard".into();
        server.spec.backups.schedule = "*/15 * * * *".into();
        server.spec.backups.storage.size = "2Gi".into();
        server.spec.access.admins = vec!["7656".into(), "7657".into()];
        server.spec.hooks.post_bootstrap = "echo ready".into();
        server.spec.server.additional_env = BTreeMap::from([
            ("UPDATE_CRON".into(), "".into()),
            ("SERVER_NAME".into(), "ignored".into()),
        ]);

        let env = env(&server, "v1", true);
        assert_eq!(
            env.names(),
            vec![
                "SERVER_NAME",
                "WORLD_NAME",
                "SERVER_PASS",
                "SERVER_ARGS",
                "SERVER_PUBLIC",
                "BACKUPS_CRON",
                "BACKUPS_IF_IDLE",
                "BACKUPS_MAX_COUNT",
                "BACKUPS_DIRECTORY",
                "ADMINLIST_IDS",
                "POST_BOOTSTRAP_HOOK",
                "UPDATE_CRON",
            ]
        );
        assert_eq!(
            env.get("SERVER_ARGS"),
            Some(&EnvVar::Value {
                name: "SERVER_ARGS".into(),
                value: "-crossplay -modifier combat hard".into()
            })
        );
    }

    #[test]
    fn backup_claim_only_when_sized() {
        let mut server = valheim();
        assert_eq!(claims(&server).unwrap().len(), 1);

        server.spec.backups.storage.size = "5Gi".into();
        let claims = claims(&server).unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1].name(), "v1-backups");
        assert_eq!(claims[1].volume, BACKUP_VOLUME);
    }

    #[test]
    fn malformed_storage_size_is_rejected() {
        let mut server = valheim();
        server.spec.storage.size = "lots".into();
        assert!(matches!(
            claims(&server),
            Err(Error::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn workload_mounts_bound_claims() {
        let server = valheim();
        let labels = server.child_labels();
        let bound = vec![BoundClaim {
            volume: WORLD_VOLUME.into(),
            mount_path: WORLD_MOUNT.into(),
            claim_name: "legacy-world".into(),
        }];

        let sts = workload(&server, &labels, &bound)
            .unwrap()
            .into_k8s("games", None);
        let spec = sts.spec.unwrap();
        let pod = spec.template.spec.unwrap();
        let container = &pod.containers[0];

        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.service_name, "v1");
        assert_eq!(pod.share_process_namespace, Some(true));
        assert_eq!(pod.service_account_name.as_deref(), Some("v1"));
        assert_eq!(container.name, "server");
        assert_eq!(
            container.image.as_deref(),
            Some("ghcr.io/lloesche/valheim-server:latest")
        );
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(
            pod.volumes.unwrap()[0]
                .persistent_volume_claim
                .as_ref()
                .unwrap()
                .claim_name,
            "legacy-world"
        );
        let mounts = container.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, WORLD_MOUNT);
        let caps = container
            .security_context
            .as_ref()
            .unwrap()
            .capabilities
            .as_ref()
            .unwrap();
        assert_eq!(caps.add.as_deref(), Some(&["SYS_NICE".to_string()][..]));
        assert_eq!(
            labels.get("gamely.io").map(String::as_str),
            Some("valheim")
        );
    }

    #[test]
    fn workload_requires_credential() {
        let mut server = valheim();
        server.spec.server.password = None;
        assert!(matches!(
            workload(&server, &server.child_labels(), &[]),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn service_mirrors_container_ports() {
        let mut server = valheim();
        server.spec.service.type_ = "LoadBalancer".into();
        let svc = service(&server, &server.child_labels()).into_k8s("games", None);
        let spec = svc.spec.unwrap();

        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 2);
        assert!(ports.iter().all(|p| p.protocol.as_deref() == Some("UDP")));
        assert_eq!(ports[0].port, GAME_PORT);
        assert_eq!(spec.selector.unwrap()["server"], "v1");
    }

    #[test]
    fn unknown_service_type_is_cluster_ip() {
        let mut server = valheim();
        server.spec.service.type_ = "Ingress".into();
        let svc = service(&server, &server.child_labels());
        assert_eq!(svc.type_.as_deref(), Some("ClusterIP"));
    }
}
