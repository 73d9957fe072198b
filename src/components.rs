use bevy::prelude::*;

use crate::body::BodyId;

/// Render entity drawing the body with this id. The body itself lives in
/// [`crate::body::BodySet`]; sprites only ever read from it.
#[derive(Component, Deref)]
pub struct BodySprite(pub BodyId);

/// Unit circle shared by every body sprite; scaled by radius.
#[derive(Resource)]
pub struct BodyMesh(pub Handle<Mesh>);
