use bevy::prelude::*;
use bevy_lod_terrain::prelude::*;

const CONFIG_PATH: &str = "default.terrain.ron";
const FLIGHT_SPEED: f32 = 400.0;
const FLIGHT_HEIGHT: f32 = 450.0;

fn main() {
    App::new()
        .add_plugins((DefaultPlugins, LodTerrainPlugin, TerrainDebugPlugin))
        .insert_resource(ClearColor(Color::srgb(0.62, 0.75, 0.88)))
        .add_systems(Startup, setup)
        .add_systems(Update, fly_viewer)
        .run();
}

fn setup(mut commands: Commands, asset_server: Res<AssetServer>) {
    // The terrain is spawned as soon as its configuration is loaded.
    commands.spawn((
        Name::new("Terrain"),
        LodTerrainSource(asset_server.load(CONFIG_PATH)),
    ));

    commands.spawn((
        Name::new("Viewer"),
        TerrainViewer,
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            far: 120_000.0,
            ..default()
        }),
        Transform::from_xyz(0.0, FLIGHT_HEIGHT, 0.0)
            .looking_at(Vec3::new(1000.0, 0.0, -1000.0), Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(1.0, 2.0, 1.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    info!("Use B to toggle the node bounds, H to hide the terrain and F to freeze the quadtree.");
}

/// Flies the viewer along the terrain diagonal, turning around at the edge of the world.
fn fly_viewer(
    time: Res<Time>,
    mut direction: Local<Option<Vec3>>,
    mut viewers: Query<&mut Transform, With<TerrainViewer>>,
) {
    let direction = direction.get_or_insert(Vec3::new(1.0, 0.0, -1.0).normalize());

    for mut transform in &mut viewers {
        transform.translation += *direction * FLIGHT_SPEED * time.delta_secs();

        let Vec3 { x, z, .. } = transform.translation;

        if x.abs().max(z.abs()) > 45_000.0 {
            *direction = -*direction;
            let target = transform.translation + *direction * 1000.0;
            transform.look_at(target.with_y(0.0), Vec3::Y);
        }
    }
}
