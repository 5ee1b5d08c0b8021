use std::collections::BTreeSet;

use crate::config::GroupRoomMap;

/// Rooms a user should be joined to given their current group set: the union
/// of the mapped rooms of every group that appears in the mapping. Groups
/// without a mapping are ignored.
pub fn resolve_add(map: &GroupRoomMap, user_groups: &[String]) -> BTreeSet<String> {
    let mut rooms = BTreeSet::new();
    for group in user_groups {
        if let Some(mapped) = map.get(group) {
            rooms.extend(mapped.iter().cloned());
        }
    }
    rooms
}

/// Rooms a user should be kicked from after losing `removed_groups`.
///
/// A room mapped by a removed group stays off the result if any group the
/// user still holds also maps to it: membership granted through one retained
/// group is never revoked because another group went away.
pub fn resolve_remove(
    map: &GroupRoomMap,
    user_groups_after: &[String],
    removed_groups: &[String],
) -> BTreeSet<String> {
    let retained = resolve_add(map, user_groups_after);

    let mut rooms = BTreeSet::new();
    for group in removed_groups {
        if let Some(mapped) = map.get(group) {
            for room in mapped {
                if !retained.contains(room) {
                    rooms.insert(room.clone());
                }
            }
        }
    }
    rooms
}
