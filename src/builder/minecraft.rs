use kube::ResourceExt;

use super::{BoundClaim, ClaimSpec, EnvList};
use crate::credential::PASSWORD_KEY;
use crate::crd::{GameServer, Minecraft};
use crate::error::{Error, Result};
use crate::types::{Container, ContainerPort, Labels, Resources, Service, ServicePort, StatefulSet};

pub const GAME_PORT: i32 = 25565;
pub const RCON_PORT: i32 = 25575;

pub const DATA_VOLUME: &str = "data";
pub const DATA_MOUNT: &str = "/data";

fn ports() -> [ContainerPort; 2] {
    [
        ContainerPort::tcp("game", GAME_PORT),
        ContainerPort::tcp("rcon", RCON_PORT),
    ]
}

pub fn claims(server: &Minecraft) -> Result<Vec<ClaimSpec>> {
    Ok(vec![ClaimSpec::new(
        DATA_VOLUME,
        DATA_MOUNT,
        server.name_any(),
        &server.spec.storage,
        &server.child_labels(),
    )?])
}

pub fn env(server: &Minecraft, rcon_secret: &str) -> EnvList {
    let spec = &server.spec;
    let settings = &spec.settings;

    EnvList::new()
        .value("EULA", if settings.accept_eula { "TRUE" } else { "FALSE" })
        .secret("RCON_PASSWORD", rcon_secret, PASSWORD_KEY)
        .non_empty("TYPE", &spec.platform.type_.to_ascii_uppercase())
        .entries(spec.platform.entries())
        .non_empty("TZ", &settings.timezone)
        .flag(settings.rotate_logs, "ENABLE_ROLLING_LOGS")
        .flag(settings.use_aikar_flags, "USE_AIKAR_FLAGS")
        .non_empty("VERSION", &settings.version)
        .non_empty("MOTD", &settings.motd)
        .non_empty("DIFFICULTY", &settings.difficulty)
        .non_empty("MAX_PLAYERS", &settings.max_players)
        .non_empty("MAX_WORLD_SIZE", &settings.max_world_size)
        .flag(settings.hardcore, "HARDCORE")
        .non_empty("SEED", &settings.seed)
        .non_empty("MODE", &settings.mode)
        .flag(settings.pvp, "PVP")
        .non_empty("SERVER_NAME", &settings.server_name)
        .joined("EXTRA_ARGS", &spec.additional_args)
        .entries(spec.hooks.entries())
        .extra(&spec.additional_env)
}

pub fn workload(
    server: &Minecraft,
    labels: &Labels,
    claims: &[BoundClaim],
) -> Result<StatefulSet> {
    let name = server.name_any();
    let credential = server
        .credential()
        .ok_or(Error::MissingField("spec.rconPassword"))?;
    let resources = &server.spec.resources;

    let container = ports().into_iter().fold(
        Container::new("server", server.image())
            .image_pull_policy(Some(server.spec.image.pull_policy()))
            .env(env(server, &credential.name).into_vars())
            .resources(Resources::new(
                resources.limits.clone(),
                resources.requests.clone(),
            )),
        |container, port| container.port(port),
    );
    let container = claims.iter().fold(container, |container, claim| {
        container.volume_mount(&claim.volume, &claim.mount_path)
    });

    Ok(claims.iter().fold(
        StatefulSet::new(&name, labels)
            .replicas(1)
            .service_account(&name)
            .rolling_update()
            .container(container),
        |workload, claim| workload.volume(claim.volume()),
    ))
}

pub fn service(server: &Minecraft, labels: &Labels) -> Service {
    ports().iter().fold(
        Service::new(server.name_any(), labels).type_(server.spec.service.service_type()),
        |service, port| service.port(ServicePort::matching(port)),
    )
}
