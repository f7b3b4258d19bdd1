//! Prints every Boot CRD manifest as a multi-document YAML stream.

use crds::{BootRevision, JavaBoot, NodeJSBoot, PhpBoot, PythonBoot, WebBoot};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        JavaBoot::crd(),
        PhpBoot::crd(),
        PythonBoot::crd(),
        NodeJSBoot::crd(),
        WebBoot::crd(),
        BootRevision::crd(),
    ];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
