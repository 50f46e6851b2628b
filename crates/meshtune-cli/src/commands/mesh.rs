use crate::cli::MeshArgs;
use crate::error::{CliError, Result};
use meshtune::SimulationBox;
use meshtune::core::mesh;

pub fn run(args: MeshArgs) -> Result<()> {
    let [lx, ly, lz]: [f64; 3] = args
        .edges
        .clone()
        .try_into()
        .map_err(|_| CliError::Argument("exactly three box edges are required".to_string()))?;
    if lx <= 0.0 || ly <= 0.0 || lz <= 0.0 {
        return Err(CliError::Argument(
            "box edges must all be positive".to_string(),
        ));
    }
    if args.spacing <= 0.0 {
        return Err(CliError::Argument(
            "the mesh spacing must be positive".to_string(),
        ));
    }

    let bx = SimulationBox::orthorhombic(lx, ly, lz);
    let (dims, spacing) = mesh::mesh_for_spacing(&bx, args.spacing);
    println!(
        "mesh {dims} ({} points), realized spacing {spacing:.4} nm",
        dims.points()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_inputs() {
        let args = MeshArgs {
            edges: vec![3.2, 3.2, 0.0],
            spacing: 0.12,
        };
        assert!(matches!(run(args), Err(CliError::Argument(_))));

        let args = MeshArgs {
            edges: vec![3.2, 3.2, 3.2],
            spacing: -0.1,
        };
        assert!(matches!(run(args), Err(CliError::Argument(_))));
    }

    #[test]
    fn accepts_a_regular_box() {
        let args = MeshArgs {
            edges: vec![3.2, 3.2, 3.2],
            spacing: 0.12,
        };
        assert!(run(args).is_ok());
    }
}
