//! Quota-aware lead distributor.
//!
//! Pure function over its inputs: given a group, its distribution setting,
//! the unassigned leads, and how many leads each collaborator already got
//! today, decide which collaborator receives which lead. No I/O happens here;
//! committing the result is the caller's job (see [`crate::run`]).

use std::collections::HashSet;

use tracing::debug;

use leaddesk_shared::{
    AssignmentAction, AssignmentCounts, CollaboratorId, DistributionSetting, Group, Lead,
    LeadDeskError, Result,
};

/// Leads the group may still receive today: `daily_quota` minus what its
/// members already got. Zero or negative means the quota is met.
pub fn remaining_quota(
    group: &Group,
    setting: &DistributionSetting,
    assignments_today: &AssignmentCounts,
) -> i64 {
    let group_leads_today: i64 = group
        .unique_members()
        .into_iter()
        .map(|member| count_for(assignments_today, member))
        .sum();
    i64::from(setting.daily_quota) - group_leads_today
}

/// Compute the lead → collaborator assignments for one group.
///
/// Leads are taken in the order given, after dropping those that do not
/// pass the setting's tier filter, and truncated to the remaining quota.
/// Each lead goes to the member with the fewest assignments so far (today's
/// prior assignments included), re-evaluated after every pick; ties go to
/// the member listed first in the group.
///
/// Returns an empty list when the quota is met, the group has no members,
/// or there is nothing to assign. Fails without computing anything if
/// `assignments_today` holds a negative count, a lead appears twice, or a
/// lead is already assigned.
pub fn compute_assignments(
    group: &Group,
    setting: &DistributionSetting,
    unassigned_leads: &[Lead],
    assignments_today: &AssignmentCounts,
) -> Result<Vec<AssignmentAction>> {
    validate_inputs(unassigned_leads, assignments_today)?;

    let members = group.unique_members();
    if members.is_empty() {
        debug!(group = %group.name, "group has no members, nothing to assign");
        return Ok(Vec::new());
    }

    let remaining = remaining_quota(group, setting, assignments_today);
    if remaining <= 0 {
        debug!(group = %group.name, remaining, "daily quota met");
        return Ok(Vec::new());
    }
    let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);

    let mut current_count: Vec<i64> = members
        .iter()
        .map(|member| count_for(assignments_today, member))
        .collect();

    let mut actions = Vec::new();
    let candidates = unassigned_leads
        .iter()
        .filter(|lead| setting.lead_tier.matches(lead.tier))
        .take(remaining);

    for lead in candidates {
        let Some(slot) = least_loaded(&current_count) else {
            break;
        };
        current_count[slot] += 1;
        actions.push(AssignmentAction {
            lead_id: lead.id.clone(),
            collaborator_id: members[slot].clone(),
        });
    }

    debug!(
        group = %group.name,
        assigned = actions.len(),
        remaining,
        "assignments computed"
    );
    Ok(actions)
}

/// Index of the smallest count; the first one wins a tie.
fn least_loaded(counts: &[i64]) -> Option<usize> {
    counts
        .iter()
        .enumerate()
        .min_by_key(|(_, count)| **count)
        .map(|(idx, _)| idx)
}

fn count_for(counts: &AssignmentCounts, member: &CollaboratorId) -> i64 {
    counts.get(member).copied().unwrap_or(0)
}

fn validate_inputs(leads: &[Lead], counts: &AssignmentCounts) -> Result<()> {
    if let Some((collaborator, count)) = counts.iter().find(|(_, count)| **count < 0) {
        return Err(LeadDeskError::invalid_input(format!(
            "negative assignment count {count} for collaborator {collaborator}"
        )));
    }

    let mut seen = HashSet::with_capacity(leads.len());
    for lead in leads {
        if !seen.insert(&lead.id) {
            return Err(LeadDeskError::invalid_input(format!(
                "lead {} appears more than once",
                lead.id
            )));
        }
        if lead.is_assigned() {
            return Err(LeadDeskError::invalid_input(format!(
                "lead {} is already assigned",
                lead.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use leaddesk_shared::{GroupId, LeadTier, TierFilter};

    use super::*;

    fn group_of(members: &[&CollaboratorId]) -> Group {
        Group {
            id: GroupId::new(),
            name: "test-group".into(),
            member_ids: members.iter().map(|m| (*m).clone()).collect(),
            created_at: Utc::now(),
        }
    }

    fn setting(group: &Group, quota: u32, tier: TierFilter) -> DistributionSetting {
        DistributionSetting {
            group_id: group.id.clone(),
            daily_quota: quota,
            lead_tier: tier,
            updated_at: Utc::now(),
        }
    }

    fn leads(n: usize) -> Vec<Lead> {
        (0..n).map(|i| Lead::new(format!("lead-{i}"), None)).collect()
    }

    fn tally(actions: &[AssignmentAction]) -> HashMap<CollaboratorId, usize> {
        let mut out = HashMap::new();
        for action in actions {
            *out.entry(action.collaborator_id.clone()).or_default() += 1;
        }
        out
    }

    #[test]
    fn splits_quota_between_two_fresh_collaborators() {
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();
        let group = group_of(&[&a, &b]);
        let setting = setting(&group, 5, TierFilter::All);
        let input = leads(8);

        let actions = compute_assignments(&group, &setting, &input, &HashMap::new()).unwrap();
        assert_eq!(actions.len(), 5);

        let counts = tally(&actions);
        assert_eq!(counts[&a], 3);
        assert_eq!(counts[&b], 2);

        // Caller order is preserved and nothing is repeated.
        let ids: Vec<_> = actions.iter().map(|a| a.lead_id.clone()).collect();
        let expected: Vec<_> = input.iter().take(5).map(|l| l.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn remaining_quota_goes_to_least_loaded() {
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();
        let group = group_of(&[&a, &b]);
        let setting = setting(&group, 5, TierFilter::All);
        let today = HashMap::from([(a.clone(), 4), (b.clone(), 0)]);

        let actions = compute_assignments(&group, &setting, &leads(3), &today).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].collaborator_id, b);
    }

    #[test]
    fn empty_group_gets_nothing() {
        let group = group_of(&[]);
        let setting = setting(&group, 3, TierFilter::All);
        let actions = compute_assignments(&group, &setting, &leads(4), &HashMap::new()).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn quota_met_returns_empty() {
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();
        let group = group_of(&[&a, &b]);

        let today = HashMap::from([(a.clone(), 2), (b.clone(), 1)]);
        let exact = setting(&group, 3, TierFilter::All);
        assert!(compute_assignments(&group, &exact, &leads(5), &today).unwrap().is_empty());

        let over = setting(&group, 1, TierFilter::All);
        assert!(compute_assignments(&group, &over, &leads(5), &today).unwrap().is_empty());

        let zero = setting(&group, 0, TierFilter::All);
        assert!(compute_assignments(&group, &zero, &leads(5), &HashMap::new()).unwrap().is_empty());
    }

    #[test]
    fn non_member_counts_do_not_consume_group_quota() {
        let a = CollaboratorId::new();
        let outsider = CollaboratorId::new();
        let group = group_of(&[&a]);
        let setting = setting(&group, 2, TierFilter::All);
        let today = HashMap::from([(outsider, 10)]);

        let actions = compute_assignments(&group, &setting, &leads(5), &today).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|x| x.collaborator_id == a));
    }

    #[test]
    fn fewer_leads_than_quota() {
        let a = CollaboratorId::new();
        let group = group_of(&[&a]);
        let setting = setting(&group, 10, TierFilter::All);
        let actions = compute_assignments(&group, &setting, &leads(2), &HashMap::new()).unwrap();
        assert_eq!(actions.len(), 2);

        let none = compute_assignments(&group, &setting, &[], &HashMap::new()).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn ties_follow_member_order() {
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();
        let c = CollaboratorId::new();
        let group = group_of(&[&c, &a, &b]);
        let setting = setting(&group, 3, TierFilter::All);

        let actions = compute_assignments(&group, &setting, &leads(3), &HashMap::new()).unwrap();
        let order: Vec<_> = actions.iter().map(|x| x.collaborator_id.clone()).collect();
        assert_eq!(order, vec![c, a, b]);
    }

    #[test]
    fn duplicate_members_counted_once() {
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();
        let group = group_of(&[&a, &a, &b]);
        let setting = setting(&group, 4, TierFilter::All);
        let today = HashMap::from([(a.clone(), 1)]);

        // Quota 4 minus a's single lead, not minus it twice.
        let actions = compute_assignments(&group, &setting, &leads(10), &today).unwrap();
        assert_eq!(actions.len(), 3);
        let counts = tally(&actions);
        assert_eq!(counts[&a], 1);
        assert_eq!(counts[&b], 2);
    }

    #[test]
    fn tier_filter_skips_other_tiers() {
        let a = CollaboratorId::new();
        let group = group_of(&[&a]);
        let setting = setting(&group, 10, "Haut de gamme".parse().unwrap());

        let input = vec![
            Lead::new("low", Some(LeadTier::Low)),
            Lead::new("high-1", Some(LeadTier::High)),
            Lead::new("unscored", None),
            Lead::new("high-2", Some(LeadTier::High)),
        ];
        let actions = compute_assignments(&group, &setting, &input, &HashMap::new()).unwrap();
        let ids: Vec<_> = actions.iter().map(|x| x.lead_id.clone()).collect();
        assert_eq!(ids, vec![input[1].id.clone(), input[3].id.clone()]);
    }

    #[test]
    fn negative_count_is_rejected() {
        let a = CollaboratorId::new();
        let group = group_of(&[&a]);
        let setting = setting(&group, 5, TierFilter::All);
        let today = HashMap::from([(a, -1)]);

        let err = compute_assignments(&group, &setting, &leads(2), &today).unwrap_err();
        assert!(matches!(err, LeadDeskError::InvalidInput { .. }));
    }

    #[test]
    fn duplicate_lead_is_rejected() {
        let a = CollaboratorId::new();
        let group = group_of(&[&a]);
        let setting = setting(&group, 5, TierFilter::All);
        let lead = Lead::new("twice", None);

        let err = compute_assignments(&group, &setting, &[lead.clone(), lead], &HashMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn already_assigned_lead_is_rejected() {
        let a = CollaboratorId::new();
        let group = group_of(&[&a]);
        let setting = setting(&group, 5, TierFilter::All);
        let mut lead = Lead::new("taken", None);
        lead.assigned_collaborator_id = Some(CollaboratorId::new());

        let err = compute_assignments(&group, &setting, &[lead], &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("already assigned"));
    }

    /// Small deterministic generator so the property sweep is reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }
    }

    #[test]
    fn properties_hold_across_random_inputs() {
        let mut rng = Lcg(42);

        for _ in 0..500 {
            let member_count = rng.next(5) as usize;
            let members: Vec<CollaboratorId> =
                (0..member_count).map(|_| CollaboratorId::new()).collect();
            let refs: Vec<&CollaboratorId> = members.iter().collect();
            let group = group_of(&refs);
            let quota = rng.next(12) as u32;
            let setting = setting(&group, quota, TierFilter::All);
            let input = leads(rng.next(15) as usize);

            let mut today = AssignmentCounts::new();
            for member in &members {
                today.insert(member.clone(), rng.next(4) as i64);
            }

            let actions = compute_assignments(&group, &setting, &input, &today).unwrap();

            let remaining = remaining_quota(&group, &setting, &today).max(0) as usize;
            assert!(actions.len() <= remaining);
            assert!(actions.len() <= input.len());
            let expected = if members.is_empty() {
                0
            } else {
                remaining.min(input.len())
            };
            assert_eq!(actions.len(), expected);

            let unique: HashSet<_> = actions.iter().map(|x| &x.lead_id).collect();
            assert_eq!(unique.len(), actions.len());
            assert!(actions.iter().all(|x| members.contains(&x.collaborator_id)));

            // Replay: every pick went to a member tied for the fewest.
            let mut counts = today.clone();
            for action in &actions {
                let min = members.iter().map(|m| counts[m]).min().unwrap();
                assert_eq!(counts[&action.collaborator_id], min);
                *counts.get_mut(&action.collaborator_id).unwrap() += 1;
            }
        }
    }

    #[test]
    fn balanced_start_stays_within_one() {
        let members: Vec<CollaboratorId> = (0..3).map(|_| CollaboratorId::new()).collect();
        let refs: Vec<&CollaboratorId> = members.iter().collect();
        let group = group_of(&refs);
        let setting = setting(&group, 100, TierFilter::All);
        let today: AssignmentCounts = members.iter().map(|m| (m.clone(), 2)).collect();

        let actions = compute_assignments(&group, &setting, &leads(11), &today).unwrap();
        let counts = tally(&actions);
        let max = members.iter().map(|m| counts.get(m).copied().unwrap_or(0)).max().unwrap();
        let min = members.iter().map(|m| counts.get(m).copied().unwrap_or(0)).min().unwrap();
        assert!(max - min <= 1);
    }
}
