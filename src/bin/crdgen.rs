use gamely_operator::{Minecraft, Valheim};
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [Valheim::crd(), Minecraft::crd()];
    for (i, crd) in crds.iter().enumerate() {
        if i > 0 {
            println!("---");
        }
        print!("{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
